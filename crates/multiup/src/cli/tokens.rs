use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use multiup_upload::TokenStore;

use crate::env::MultiupEnv;

#[derive(Clone, Debug, Subcommand)]
pub enum TokenCommands {
    #[command(alias = "ls", name = "list", about = "Show cached logins and when they expire")]
    List,
    #[command(alias = "rm", name = "clear", about = "Forget cached logins")]
    Clear(ClearArg),
}

#[derive(Clone, Debug, Args)]
pub struct ClearArg {
    /// Only this host [default: every host]
    pub host: Option<String>,
}

pub fn run(cmd: TokenCommands, env: &MultiupEnv) -> Result<()> {
    let store = env.token_store()?;
    match cmd {
        TokenCommands::List => {
            for line in list(&store) {
                println!("{line}");
            }
        }
        TokenCommands::Clear(arg) => {
            let cleared = clear(&store, arg.host.as_deref())?;
            println!("cleared {cleared} cached login(s)");
        }
    }
    Ok(())
}

fn list(store: &TokenStore) -> Vec<String> {
    let now = Utc::now().timestamp();
    store
        .hosts()
        .into_iter()
        .filter_map(|host| store.get(&host))
        .map(|token| {
            let expiry = match token.expires_at().map(|at| at - now) {
                None => "never expires".to_string(),
                Some(left) if left > 0 => format!("expires in {left}s"),
                Some(_) => "expired".to_string(),
            };
            format!("{:<12} {expiry}", token.host_id)
        })
        .collect()
}

fn clear(store: &TokenStore, host: Option<&str>) -> Result<usize> {
    match host {
        Some(host) => {
            let had = store.get(host).is_some();
            store
                .invalidate(host)
                .with_context(|| format!("failed to clear the login for {host}"))?;
            Ok(usize::from(had))
        }
        None => {
            let count = store.hosts().len();
            store.clear().context("failed to clear cached logins")?;
            Ok(count)
        }
    }
}
