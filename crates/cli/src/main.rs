use std::process::ExitCode;

fn main() -> ExitCode {
    tagwatch_cli::run()
}
