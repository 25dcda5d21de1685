use clap::Parser;

fn main() {
    let cli = cadencectl::Cli::parse();
    let outcome = cadencectl::init_tracing(cli.log_level.as_deref()).and_then(|()| cadencectl::run(cli));
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
