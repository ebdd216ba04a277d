use std::process::ExitCode;

fn main() -> ExitCode {
    deptflow_cli::run()
}
