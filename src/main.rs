//! Command-line front end for a scriptshelf directory.
//!
//! Every command is turned into an [`ApiRequest`] and run through
//! [`Shelf::dispatch`], with stdout or a download file standing in for the
//! HTTP response body.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWrite;

use scriptshelf::api::{ApiRequest, ResponseHead, ResponseSink};
use scriptshelf::cli::{Cli, Command};
use scriptshelf::{Shelf, logging};

/// Application entry point.
///
/// Parses command-line arguments, builds the shelf from them and runs the
/// selected command.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    let shelf = Shelf::new(cli.config());
    let request = cli.request();
    let target = match &cli.command {
        Command::Download {
            output,
            pipe: false,
            force,
            ..
        } => Target::File {
            output: output.clone(),
            force: *force,
        },
        _ => Target::Stdout,
    };

    let mut sink = CliSink::new(target, cli.is_verbose());
    run(&shelf, &request, &mut sink).await?;

    if matches!(cli.command, Command::List { .. } | Command::All) {
        println!();
    }
    if let Some(path) = &sink.saved_to {
        if cli.quiet == 0 {
            eprintln!("saved: {}", path.display());
        }
    }
    Ok(())
}

/// Dispatch `request`, removing a partially written download on failure.
async fn run(shelf: &Shelf, request: &ApiRequest, sink: &mut CliSink) -> Result<()> {
    let result = shelf.dispatch(request, sink).await;
    if let Err(e) = result {
        if let Some(path) = sink.saved_to.take() {
            // Close the handle first; some platforms refuse to remove open files
            sink.out = None;
            let _ = tokio::fs::remove_file(&path).await;
        }
        return Err(e).with_context(|| describe(request));
    }
    Ok(())
}

fn describe(request: &ApiRequest) -> String {
    match (&request.category, &request.identifier) {
        (Some(category), Some(name)) => {
            format!("{:?} failed for {category}/{name}", request.operation)
        }
        (Some(category), None) => format!("{:?} failed for {category}", request.operation),
        _ => format!("{:?} failed", request.operation),
    }
}

/// Where the response body goes once the head is known
#[derive(Debug)]
enum Target {
    Stdout,
    /// A download file; without `output` it is named after the attachment
    File { output: Option<PathBuf>, force: bool },
}

/// Response sink writing to stdout or a file
struct CliSink {
    target: Target,
    verbose: bool,
    out: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    saved_to: Option<PathBuf>,
}

impl CliSink {
    fn new(target: Target, verbose: bool) -> Self {
        Self {
            target,
            verbose,
            out: None,
            saved_to: None,
        }
    }

    fn out(&mut self) -> io::Result<Pin<&mut (dyn AsyncWrite + Send + 'static)>> {
        self.out
            .as_mut()
            .map(|out| out.as_mut())
            .ok_or_else(|| io::Error::other("response body written before head"))
    }
}

#[async_trait]
impl ResponseSink for CliSink {
    async fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        if self.verbose {
            eprintln!("{}", serde_json::to_string(&head)?);
        }

        match &self.target {
            Target::Stdout => {
                self.out = Some(Box::pin(tokio::io::stdout()));
            }
            Target::File { output, force } => {
                let path = output
                    .clone()
                    .or_else(|| head.attachment.as_deref().map(PathBuf::from))
                    .ok_or_else(|| io::Error::other("response has no file name"))?;

                let mut options = OpenOptions::new();
                options.write(true);
                if *force {
                    options.create(true).truncate(true);
                } else {
                    options.create_new(true);
                }
                let file = options.open(&path).await.map_err(|e| {
                    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
                })?;

                self.out = Some(Box::pin(file));
                self.saved_to = Some(path);
            }
        }
        Ok(())
    }
}

impl AsyncWrite for CliSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().out() {
            Ok(out) => out.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().out() {
            Ok(out) => out.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().out.as_mut() {
            Some(out) => out.as_mut().poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
