use std::process::ExitCode;

fn main() -> ExitCode {
    vmgate_cli::run()
}
