use std::process::ExitCode;

fn main() -> ExitCode {
    souq_cli::run()
}
