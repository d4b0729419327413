use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use super::{hosts, tokens, upload};
use crate::env::MultiupEnv;

#[derive(Clone, Debug, Parser)]
#[command(name = "multiup", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// More output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file [default: ~/.multiup/multiup.toml]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "up", name = "upload", about = "Upload a directory as one gallery")]
    Upload(upload::UploadArg),
    #[command(alias = "ls", name = "hosts", about = "List known hosts")]
    Hosts(hosts::HostsArg),
    #[command(name = "tokens", subcommand, about = "Inspect or clear cached logins")]
    Tokens(tokens::TokenCommands),
}

impl Commands {
    pub fn run(self, env: &MultiupEnv) -> Result<()> {
        match self {
            Commands::Upload(arg) => upload::run(arg, env),
            Commands::Hosts(arg) => hosts::run(arg, env),
            Commands::Tokens(cmd) => tokens::run(cmd, env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        App::command().debug_assert();
    }

    #[test]
    fn upload_arguments_parse() {
        let app = App::parse_from([
            "multiup", "-vv", "upload", "shots", "-H", "imx", "--host", "rapidgator", "--gallery-id",
            "imx=G1", "--report", "out.json",
        ]);
        assert_eq!(app.verbose, 2);
        let Commands::Upload(arg) = app.cmd else {
            panic!("expected upload");
        };
        assert_eq!(arg.dir, PathBuf::from("shots"));
        assert_eq!(arg.hosts, vec!["imx", "rapidgator"]);
        assert_eq!(arg.gallery_ids, vec![("imx".to_string(), "G1".to_string())]);
        assert_eq!(arg.report, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn upload_needs_a_host() {
        assert!(App::try_parse_from(["multiup", "upload", "shots"]).is_err());
    }

    #[test]
    fn token_clear_takes_an_optional_host() {
        let app = App::parse_from(["multiup", "tokens", "clear", "rapidgator"]);
        assert!(matches!(
            app.cmd,
            Commands::Tokens(tokens::TokenCommands::Clear(ref arg)) if arg.host.as_deref() == Some("rapidgator")
        ));
        let app = App::parse_from(["multiup", "tokens", "clear"]);
        assert!(matches!(app.cmd, Commands::Tokens(tokens::TokenCommands::Clear(ref arg)) if arg.host.is_none()));
    }
}
