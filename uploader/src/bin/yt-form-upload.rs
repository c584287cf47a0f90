use clap::{Parser, Subcommand};
use eyre::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use yt_form_upload::config::{Config, DEFAULT_CONFIG_PATH};
use yt_form_upload::upload::PEOPLE_AND_BLOGS;
use yt_form_upload::{
    Backend, CredentialStore, FormController, FormInput, PrivacyStatus, SecretPassword, Session,
    UploadTask, YouTubeBackend,
};

/// Upload a local video to YouTube using a stored OAuth credential.
#[derive(Parser)]
#[command(name = "yt-form-upload", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stored OAuth credential (overrides the configuration file)
    #[arg(long)]
    token: Option<PathBuf>,

    /// Password for a gated form (prompted for if needed and not given)
    #[arg(long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill in the form and upload a video
    Upload {
        /// Video file to upload (.mp4)
        #[arg(long)]
        video: Option<PathBuf>,

        /// Video title
        #[arg(long, default_value = "")]
        title: String,

        /// Video description
        #[arg(long, default_value = "")]
        description: String,

        /// Comma-separated tags
        #[arg(long, default_value = "tag1, tag2, tag3")]
        tags: String,

        /// Category code (22 is People & Blogs)
        #[arg(long, default_value = PEOPLE_AND_BLOGS)]
        category: String,

        /// public, private, or unlisted (defaults to the configured privacy)
        #[arg(long)]
        privacy: Option<PrivacyStatus>,

        /// Destination channel, by name or ID
        #[arg(long)]
        channel: Option<String>,
    },

    /// List the channels the stored credential owns
    Channels,
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(token) = cli.token {
        config.credential.path = token;
    }

    let mut form =
        FormController::new(Session::new()).with_channel_selection(config.form.channel_selection);
    if let Some(password) = config.form.gate_password() {
        form = form.with_gate(SecretPassword::new(password));
    }
    form.open();
    if !form.is_form_visible() {
        let candidate = match cli.password {
            Some(password) => password,
            None => prompt("Password: ")?,
        };
        if let Err(e) = form.enter_password(&candidate) {
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    }

    let store = CredentialStore::new(
        &config.credential.path,
        config.credential.persist_refreshed,
    );
    let http = reqwest::Client::builder()
        .build()
        .context("build HTTP client")?;
    let mut backend =
        YouTubeBackend::new(store, config.api.clone(), http).on_upload_started(follow_upload);

    match cli.command {
        Command::Channels => match backend.owned_channels().await {
            Ok(channels) => {
                for (name, id) in channels {
                    println!("{name} - {id}");
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Error: {e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Upload {
            video,
            title,
            description,
            tags,
            category,
            privacy,
            channel,
        } => {
            let input = FormInput {
                video,
                title,
                description,
                tags,
                category_id: category,
                privacy_status: privacy.unwrap_or(config.form.default_privacy),
                channel,
            };
            let result = form.submit(&mut backend, &input).await;
            let message = form.message();
            match result {
                Ok(_) => {
                    println!("{}", message.unwrap_or_default());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{}", message.unwrap_or_else(|| format!("Error: {e}")));
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Shows a progress bar for `task` and cancels it on Ctrl-C.
fn follow_upload(task: &UploadTask) {
    let mut progress = task.progress();
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    tokio::spawn(async move {
        // ends once the upload task drops its sender
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            bar.set_length(current.total);
            bar.set_position(current.sent);
        }
        bar.finish_and_clear();
    });

    let cancel = task.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling upload");
            cancel.cancel();
        }
    });
}

fn prompt(label: &str) -> eyre::Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{label}").context("write prompt")?;
    stderr.flush().context("flush prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
