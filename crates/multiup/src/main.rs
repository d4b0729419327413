use anyhow::Result;
use clap::Parser;

use crate::cli::App;
use crate::env::MultiupEnv;

mod cli;
mod env;
mod logging;
mod ui;

fn main() -> Result<()> {
    let app = App::parse();
    logging::init_logging(app.verbose)?;

    let env = MultiupEnv::new(app.config.as_deref())?;
    app.cmd.run(&env)
}
