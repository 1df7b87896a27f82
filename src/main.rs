use std::io::{self, BufRead, Read, Write};

use anyhow::{Result, anyhow};
use clap::Parser;

use screen_translator::orchestrator::{
    CaptureMode, ConsolePresenter, PresetDialog, StdoutClipboard, TextField,
};
use screen_translator::{ConsoleOrchestrator, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "screen-translator",
    version,
    about = "Capture a screen region, OCR it, translate the text"
)]
struct Cli {
    /// Target language (default: translate.default_lang from settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Capture without showing a placeholder; print the result when done
    #[arg(long = "silent")]
    silent: bool,

    /// Translate TEXT without capturing ("-" reads stdin)
    #[arg(long = "translate", value_name = "TEXT")]
    translate: Option<String>,

    /// Start the local control server on ADDR (e.g. 127.0.0.1:11223)
    #[arg(long = "serve", value_name = "ADDR")]
    serve: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    screen_translator::logging::init(cli.verbose)?;
    if cli.interactive {
        return run_interactive(cli).await;
    }

    let input = match cli.translate.as_deref() {
        Some("-") => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        Some(text) => Some(text.to_string()),
        None => None,
    };

    let output = screen_translator::run(
        screen_translator::Config {
            lang: cli.lang,
            silent: cli.silent,
            translate_only: input.is_some(),
            serve: cli.serve,
            settings_path: cli.read_settings,
        },
        input,
    )
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

struct InteractiveState {
    orchestrator: ConsoleOrchestrator,
    lang: String,
}

impl InteractiveState {
    fn new(cli: &Cli) -> Result<Self> {
        let config = screen_translator::Config {
            lang: cli.lang.clone(),
            settings_path: cli.read_settings.clone(),
            ..Default::default()
        };
        let settings: Settings = screen_translator::load(&config)?;
        let lang = screen_translator::resolve_lang(cli.lang.as_deref(), &settings)?;
        Ok(Self {
            orchestrator: screen_translator::console_orchestrator(&settings)?,
            lang,
        })
    }
}

async fn run_interactive(cli: Cli) -> Result<()> {
    let mut state = InteractiveState::new(&cli)?;
    println!("Interactive mode. Use /quit or /exit to finish.");
    println!("Type /help to see available commands.");

    let mut line = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;
        if stdin_lock.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.starts_with('/') {
            match handle_interactive_command(input, &mut state, &mut stdin_lock).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => eprintln!("error: {:#}", err),
            }
            continue;
        }

        // Plain lines are translated directly.
        let report = state.orchestrator.translate_text(input, &state.lang).await;
        println!("{}", report.texts.translated);
    }
    Ok(())
}

async fn handle_interactive_command(
    input: &str,
    state: &mut InteractiveState,
    stdin: &mut impl BufRead,
) -> Result<bool> {
    let (command, arg) = split_command(input);
    match command {
        "/quit" | "/exit" if arg.is_empty() => return confirm_exit(stdin),
        "/help" => print_interactive_help(),
        "/capture" => {
            state
                .orchestrator
                .capture(CaptureMode::Interactive, &state.lang)
                .await;
            ConsolePresenter::print_texts(&state.orchestrator.texts());
        }
        "/capture-silent" => {
            state
                .orchestrator
                .capture(CaptureMode::Silent, &state.lang)
                .await;
            ConsolePresenter::print_texts(&state.orchestrator.texts());
        }
        "/show" => ConsolePresenter::print_texts(&state.orchestrator.texts()),
        "/clear" => {
            state.orchestrator.clear();
        }
        "/translate" => {
            let text = if arg.is_empty() {
                state.orchestrator.texts().extracted
            } else {
                arg.to_string()
            };
            let report = state.orchestrator.translate_text(&text, &state.lang).await;
            println!("{}", report.texts.translated);
        }
        "/copy" => {
            let focus = parse_field(arg)?;
            state.orchestrator.copy(focus, &StdoutClipboard);
        }
        "/save" => {
            let dialog = if arg.is_empty() {
                PresetDialog::default_path()
            } else {
                PresetDialog::path(arg)
            };
            state.orchestrator.save(&dialog).await;
        }
        "/lang" => {
            if arg.is_empty() {
                println!("lang: {}", state.lang);
            } else {
                screen_translator::validate_lang_code(arg)?;
                state.lang = arg.to_string();
                println!("lang set to {}", arg);
            }
        }
        _ => eprintln!("unknown command: {}", input.trim()),
    }
    Ok(false)
}

/// Splits `/command rest of line` at the first whitespace.
fn split_command(input: &str) -> (&str, &str) {
    let trimmed = input.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (trimmed, ""),
    }
}

fn confirm_exit(stdin: &mut impl BufRead) -> Result<bool> {
    print!("Are you sure you want to exit the application? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    if stdin.read_line(&mut answer)? == 0 {
        return Ok(true);
    }
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn parse_field(arg: &str) -> Result<Option<TextField>> {
    match arg.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "extracted" => Ok(Some(TextField::Extracted)),
        "translated" => Ok(Some(TextField::Translated)),
        other => Err(anyhow!("expected extracted/translated, got '{}'", other)),
    }
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  /quit, /exit                  Exit interactive mode");
    println!("  /capture                      Select a region and translate it");
    println!("  /capture-silent               Capture without the scanning placeholder");
    println!("  /translate [text]             Translate text (default: extracted text)");
    println!("  /copy [extracted|translated]  Print the chosen text for the clipboard");
    println!("  /save [path]                  Save the shown text (default: captures dir)");
    println!("  /show                         Show extracted and translated text");
    println!("  /clear                        Clear both texts");
    println!("  /lang <code>                  Set target language (or show current)");
    println!("  <text>                        Translate a plain line");
}
