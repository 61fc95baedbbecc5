use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};

use crate::ingest::{Phase, ProgressEvent, ProgressSink, RecordingSink, SinkError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ProgressMode {
    /// Bar on terminals, lines otherwise
    #[default]
    Auto,
    /// `<phase>: <percent>%` lines on stdout
    Lines,
    /// Progress bar on stderr
    Bar,
}

/// Pick a renderer for `mode`. With `json`, stdout is reserved for the final report.
pub fn renderer(mode: ProgressMode, json: bool) -> Box<dyn ProgressSink + Send> {
    let terminal = io::stderr().is_terminal();
    match mode {
        ProgressMode::Bar => Box::new(BarSink::new()),
        ProgressMode::Auto if terminal => Box::new(BarSink::new()),
        _ if json => Box::new(RecordingSink::default()),
        _ => Box::new(LineSink::new(io::stdout())),
    }
}

pub fn format_event(event: &ProgressEvent) -> String {
    match event.percent {
        Some(percent) => format!("{}: {}%", event.phase.label(), percent.floor() as u64),
        None => format!("{}: ...", event.phase.label()),
    }
}

/// Writes one line per event, skipping lines identical to the previous one.
pub struct LineSink<W: Write> {
    out: W,
    last: Option<String>,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for LineSink<W> {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        let line = format_event(&event);
        if self.last.as_deref() == Some(line.as_str()) {
            return Ok(());
        }
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        self.last = Some(line);
        Ok(())
    }
}

pub struct BarSink {
    pb: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:<20} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Self { pb }
    }
}

impl ProgressSink for BarSink {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        self.pb.set_prefix(event.phase.label());
        match event.percent {
            Some(percent) => {
                self.pb.set_message("");
                self.pb.set_position(percent.floor() as u64);
            }
            None => self.pb.set_message("..."),
        }
        if event.phase == Phase::Done {
            self.pb.finish_and_clear();
        }
        Ok(())
    }
}

impl Drop for BarSink {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.abandon();
        }
    }
}
