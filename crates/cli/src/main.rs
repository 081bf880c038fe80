use std::process::ExitCode;

fn main() -> ExitCode {
    pagebot_cli::run()
}
