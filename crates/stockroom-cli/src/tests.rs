use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["stockroom-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["stockroom-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["stockroom-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn sync_normalizes_by_default() {
    let cli = Cli::try_parse_from(["stockroom-cli", "sync"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            no_normalize: false
        })
    ));

    let cli = Cli::try_parse_from(["stockroom-cli", "sync", "--no-normalize"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync { no_normalize: true })
    ));
}

#[test]
fn normalize_limit_is_optional_and_positive() {
    let cli = Cli::try_parse_from(["stockroom-cli", "normalize"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Normalize { limit: None })
    ));

    let cli = Cli::try_parse_from(["stockroom-cli", "normalize", "--limit", "5"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Normalize { limit: Some(5) })
    ));

    assert!(Cli::try_parse_from(["stockroom-cli", "normalize", "--limit", "0"]).is_err());
}

#[test]
fn parses_recompute_stock() {
    let cli = Cli::try_parse_from(["stockroom-cli", "recompute-stock"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::RecomputeStock)));
}

#[test]
fn runs_limit_defaults_to_twenty() {
    let cli = Cli::try_parse_from(["stockroom-cli", "runs"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Runs { limit: 20 })));

    let cli = Cli::try_parse_from(["stockroom-cli", "runs", "--limit", "3"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Runs { limit: 3 })));
}
