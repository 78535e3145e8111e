use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = ctxpack::cli::Cli::parse();
    ctxpack::init(cli.log_level());

    cli.run()
}
