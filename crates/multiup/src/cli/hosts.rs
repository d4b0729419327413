use anyhow::Result;
use clap::Args;
use multiup_hosts::HostDescriptor;
use multiup_upload::EngineConfig;

use crate::env::MultiupEnv;

#[derive(Clone, Debug, Args)]
pub struct HostsArg {
    /// Include disabled hosts
    #[arg(short, long)]
    pub all: bool,
}

pub fn run(arg: HostsArg, env: &MultiupEnv) -> Result<()> {
    let registry = env.registry()?;
    let config = env.engine_config()?;

    let hosts: Vec<&HostDescriptor> = if arg.all {
        registry.iter().collect()
    } else {
        registry.list_enabled()
    };
    for host in hosts {
        println!("{}", describe(host, &config));
    }
    Ok(())
}

fn describe(host: &HostDescriptor, config: &EngineConfig) -> String {
    let settings = config.host_settings(&host.id);
    let ready = match settings {
        Some(s) if !s.enabled => "disabled in config",
        Some(s) if s.credential(host.auth_kind).is_some() => "ready",
        _ => "no credentials",
    };
    let limit = match host.max_file_size {
        0 => "no size limit".to_string(),
        n => format!("max {n} bytes"),
    };
    let gallery = if host.supports_gallery { ", galleries" } else { "" };
    format!(
        "{:<12} {:<20} {} / {}, {limit}{gallery} [{ready}]",
        host.id, host.display_name, host.auth_kind, host.protocol
    )
}
