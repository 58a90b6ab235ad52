use doublefork::cli::Cli;

fn main() {
    if let Err(e) = Cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
