use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use labelbridge::{Args, OutputFormat, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let config = args.config().map(std::path::Path::to_path_buf);
        let (command, maybe_mock_args) = args.into_command_and_mock_args()?;

        run(
            command,
            &mut stdout,
            maybe_mock_args,
            config.as_deref(),
            log_level,
            output_format,
        )
        .await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
