use anyhow::Result;

use bad_reader::cli::commands::run_cli;

fn main() -> Result<()> {
    run_cli()
}
