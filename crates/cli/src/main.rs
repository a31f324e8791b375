use std::process::ExitCode;

fn main() -> ExitCode {
    krishi_cli::run()
}
