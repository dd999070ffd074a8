//! Line-oriented front end for the session core.
//!
//! Reads one command per line from stdin, runs it against the session and
//! prints the outcome together with any pending notification.

use anyhow::{Context, Result};
use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;

use dbchat::services::{CellValue, QueryResult, RecordId};
use dbchat::state::Collaborators;
use dbchat::{ApiClient, AppConfig, Preferences, Session};

const HELP: &str = "\
Commands:
  status                   Show connection, model and history state
  connect <conn-str>       Connect to a database
  test <conn-str>          Test a connection string without connecting
  models                   List AI connections
  use <id>                 Select an AI connection
  ask <prompt>             Generate SQL for a question and run it
  run <sql>                Run SQL directly
  history                  Reload and list query history
  history delete <id>      Delete one history item
  history clear            Delete all history
  theme                    Toggle dark mode
  reset                    Clear notifications and re-run startup checks
  quit                     Exit";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dbchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let preferences = match &config.preferences_path {
        Some(path) => Preferences::new(path),
        None => Preferences::open_default()?,
    };

    tracing::info!("Using API at {}", config.api_base_url);
    let client = ApiClient::from_config(&config);
    let session = Session::new(Collaborators::from_client(client), config.concurrency);

    smol::block_on(async {
        session.init().await;
        print_status(&session).await;
        flush_notifications(&session).await;

        let mut lines = BufReader::new(smol::Unblock::new(std::io::stdin())).lines();
        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read command")?;
            match run_command(&session, &preferences, line.trim()).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => eprintln!("error: {:#}", e),
            }
            flush_notifications(&session).await;
        }

        session.teardown().await;
        Ok::<_, anyhow::Error>(())
    })
}

enum Flow {
    Continue,
    Quit,
}

async fn run_command(session: &Session, preferences: &Preferences, line: &str) -> Result<Flow> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(Flow::Quit),
        "status" => print_status(session).await,
        "connect" => {
            session.connect(rest).await;
        }
        "test" => {
            let test = session.test_connection(rest).await;
            println!(
                "{}",
                if test.ok { "Connection OK" } else { "Connection failed" }
            );
        }
        "models" => print_models(session).await,
        "use" => {
            if !session.select_connection(&RecordId::from(rest)).await {
                println!("No AI connection with id {}", rest);
            }
        }
        "ask" => {
            if let Some(generated) = session.submit_prompt(rest).await {
                println!("{}\n-- {}", generated.query, generated.explanation);
                if let Some(result) = session.execute_query(&generated.query).await {
                    print_rows(&result);
                }
            }
            session.acknowledge_query_phase().await;
        }
        "run" => {
            if let Some(result) = session.execute_query(rest).await {
                print_rows(&result);
            }
            session.acknowledge_query_phase().await;
        }
        "history" => match rest.split_once(char::is_whitespace).unwrap_or((rest, "")) {
            ("", _) => {
                if session.load_history().await {
                    print_history(session).await;
                }
            }
            ("delete", id) => {
                session.delete_history_item(&RecordId::from(id.trim())).await;
            }
            ("clear", _) => {
                session.clear_history().await;
            }
            (other, _) => println!("Unknown history command: {}", other),
        },
        "theme" => {
            let dark = !preferences.dark_mode().await?;
            preferences.set_dark_mode(dark).await?;
            println!("Dark mode {}", if dark { "on" } else { "off" });
        }
        "reset" => session.reset().await,
        other => println!("Unknown command: {} (try `help`)", other),
    }
    Ok(Flow::Continue)
}

async fn flush_notifications(session: &Session) {
    if let Some(message) = session.success_message().await {
        println!("ok: {}", message);
        session.clear_success_message().await;
    }
    if let Some(error) = session.error().await {
        println!("error: {}", error);
        session.clear_error().await;
    }
}

async fn print_status(session: &Session) {
    let snapshot = session.snapshot().await;
    println!(
        "Database: {}",
        if snapshot.database_connected { "connected" } else { "not connected" }
    );
    if let Some(schema) = &snapshot.database_schema {
        let tables = schema.table_names();
        if !tables.is_empty() {
            println!("Tables: {}", tables.join(", "));
        }
    }
    match &snapshot.selected_connection {
        Some(connection) => println!(
            "Model: {} ({} {})",
            connection.name, connection.service_kind, connection.model_name
        ),
        None => println!("Model: none selected"),
    }
    println!("History: {} items", snapshot.history_items.len());
}

async fn print_models(session: &Session) {
    let selected = session.selected_connection().await.map(|c| c.id);
    let connections = session.ai_connections().await;
    if connections.is_empty() {
        println!("No AI connections configured");
    }
    for connection in connections {
        let marker = if Some(&connection.id) == selected.as_ref() { "*" } else { " " };
        println!(
            "{} {:>4}  {}  {} {}",
            marker, connection.id, connection.name, connection.service_kind, connection.model_name
        );
    }
}

async fn print_history(session: &Session) {
    let items = session.history_items().await;
    if items.is_empty() {
        println!("No history");
    }
    for item in items {
        println!(
            "{:>4}  {}  {}\n      {}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M"),
            item.prompt,
            item.generated_query
        );
    }
}

fn print_rows(result: &QueryResult) {
    if result.is_empty() {
        println!("(0 rows)");
        return;
    }

    let columns = result.columns();
    println!("{}", columns.join(" | "));
    for row in result.rows() {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| {
                row.get(column)
                    .unwrap_or(CellValue::Null)
                    .to_string()
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("({} rows)", result.len());
}
