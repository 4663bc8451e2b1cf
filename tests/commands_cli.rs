mod support;

use std::io::Write as _;

use assert_matches::assert_matches;
use clap::Parser;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use support::png_bytes;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl labelbridge::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: labelbridge::Args) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let output_format = args
        .output_format()
        .unwrap_or(labelbridge::OutputFormat::Pretty);
    let config = args.config().map(std::path::Path::to_path_buf);
    let (command, maybe_mock_args) = args.into_command_and_mock_args()?;
    labelbridge::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        maybe_mock_args,
        config.as_deref(),
        None,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = labelbridge::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args).await
}

#[tokio::test]
async fn discover_lists_mock_printers_as_json() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "labelbridge",
        "--mock",
        "--mock-printers",
        "A1|mock://a;B2|mock://b",
        "--output",
        "json",
        "discover",
    ])
    .await?;

    assert_snapshot!(stdout.trim_end(), @r#"
    [
      {
        "serial": "A1",
        "path": "mock://a"
      },
      {
        "serial": "B2",
        "path": "mock://b"
      }
    ]
    "#);
    Ok(())
}

#[tokio::test]
async fn status_renders_table_for_mock_printers() -> anyhow::Result<()> {
    let mock = labelbridge::MockArgs::builder()
        .fixture("B2|mock://b;A1|mock://a")?
        .build();
    let args = labelbridge::Args::new(labelbridge::Command::Status).with_mock(mock);

    let stdout = run_with_parsed_args(args).await?;

    assert_snapshot!(stdout.trim_end(), @r"
    ╭────────┬───────────┬─────────────────┬───────────┬────────╮
    │ serial │ model     │ media           │ phase     │ errors │
    ├────────┼───────────┼─────────────────┼───────────┼────────┤
    │ A1     │ QL-820NWB │ 62mm continuous │ receiving │ none   │
    │ B2     │ QL-820NWB │ 62mm continuous │ receiving │ none   │
    ╰────────┴───────────┴─────────────────┴───────────┴────────╯
    ");
    Ok(())
}

#[tokio::test]
async fn print_sends_png_to_mock_printer() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&png_bytes(32, 32))?;
    let path = file.path().to_string_lossy().into_owned();

    let stdout = run_with_argv([
        "labelbridge",
        "--mock",
        "--mock-printers",
        "A1|mock://a",
        "--output",
        "json",
        "print",
        "A1",
        path.as_str(),
    ])
    .await?;

    let report: serde_json::Value = serde_json::from_str(&stdout)?;
    assert_eq!(serde_json::json!({"serial": "A1", "outcome": "success"}), report);
    Ok(())
}

#[tokio::test]
async fn print_to_unknown_serial_fails() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&png_bytes(8, 8))?;
    let args = labelbridge::Args::new(labelbridge::Command::Print(labelbridge::PrintArgs::new(
        "Z9",
        file.path(),
    )))
    .with_mock(labelbridge::MockArgs::builder().fixture("A1|mock://a")?.build());

    let error = run_with_parsed_args(args)
        .await
        .expect_err("unknown serial should fail");

    assert_matches!(
        error.downcast_ref::<labelbridge::PrintError>(),
        Some(labelbridge::PrintError::DeviceNotFound { serial }) if serial == "Z9"
    );
    Ok(())
}

#[tokio::test]
async fn missing_explicit_config_is_an_error() -> anyhow::Result<()> {
    let args = labelbridge::Args::new(labelbridge::Command::Discover)
        .with_mock(labelbridge::MockArgs::builder().fixture("A1|mock://a")?.build())
        .with_config("/nonexistent/labelbridge.json");

    let error = run_with_parsed_args(args)
        .await
        .expect_err("missing config should fail");

    assert_matches!(
        error.downcast_ref::<labelbridge::ConfigError>(),
        Some(labelbridge::ConfigError::NotFound { .. })
    );
    Ok(())
}
