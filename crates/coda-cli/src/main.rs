fn main() {
    coda_cli::init_logging();
    std::process::exit(coda_cli::run_cli_from_args(std::env::args_os()));
}
