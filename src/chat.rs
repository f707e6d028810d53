// Terminal front end over the same session + driver the web UI uses.

use anyhow::{Context, Result};
use labs_portal::{constants, CompletionDriver, RequestConfig, Session, Turn};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

const NEW_CHAT: &str = "/new";
const QUIT: &str = "/quit";

/// One line of terminal input. Commands are matched on the trimmed line; a
/// message keeps the text exactly as typed.
#[derive(Debug, PartialEq)]
enum ChatInput {
    Blank,
    Quit,
    NewChat,
    Message(String),
}

impl ChatInput {
    fn parse(line: String) -> Self {
        match line.trim() {
            "" => Self::Blank,
            QUIT => Self::Quit,
            NEW_CHAT => Self::NewChat,
            _ => Self::Message(line),
        }
    }
}

pub async fn run_terminal_chat(driver: CompletionDriver, config: RequestConfig) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let Some(api_key) = read_api_key(&mut lines).await? else {
        println!("{}", constants::CREDENTIAL_PROMPT);
        return Ok(());
    };

    let mut session = Session::new();
    info!(session = %session.id(), model = config.model(), "Terminal chat ready");
    println!(
        "Chatting with {} (temperature {:.1}). Type {} for a fresh chat, {} to leave.",
        config.model(),
        config.temperature(),
        NEW_CHAT,
        QUIT
    );

    loop {
        prompt("you> ")?;
        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let text = match ChatInput::parse(line) {
            ChatInput::Blank => continue,
            ChatInput::Quit => break,
            ChatInput::NewChat => {
                session.reset();
                println!("(new chat)");
                continue;
            }
            ChatInput::Message(text) => text,
        };

        session.append(Turn::user(text));
        prompt("assistant> ")?;
        let result = driver
            .complete(&mut session, &config, Some(&api_key), |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();

        // The key was checked up front, so any failure here comes from the service.
        if let Err(e) = result {
            println!("Error: {}", e);
            println!("{}", constants::COMPLETION_FAILURE_HINT);
        }
    }

    Ok(())
}

async fn read_api_key(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    prompt("OpenAI API key: ")?;
    let key = lines.next_line().await.context("Failed to read API key")?;
    Ok(key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

fn prompt(label: &str) -> Result<()> {
    print!("{}", label);
    std::io::stdout().flush().context("Failed to flush stdout")
}
