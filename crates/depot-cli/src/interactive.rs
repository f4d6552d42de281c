//! Terminal prompts and step output for the deploy commands.
//!
//! Uses dialoguer for the archive-path prompt and console for styling.

use std::io::{self, Write};
use std::path::Path;

use console::style;
use dialoguer::{Input, theme::ColorfulTheme};

use depot_core::deploy::{DeployFailure, DeployReport};
use depot_core::error::{DepotError, Result as DepotResult};
use depot_core::resolve::PathPrompt;
use depot_core::service::ServiceOutcome;

/// Asks for an archive path on the terminal.
#[derive(Default)]
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompts only make sense when a person is at the terminal.
    pub fn available() -> bool {
        console::Term::stderr().is_term()
    }
}

impl PathPrompt for TerminalPrompt {
    fn prompt_archive_path(&self) -> DepotResult<Option<String>> {
        let answer: String = Input::with_theme(&self.theme)
            .with_prompt("Path to the package archive (.zip)")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| DepotError::Io {
                context: "read archive path".to_string(),
                source: io::Error::other(e),
            })?;
        Ok(Some(answer).filter(|a| !a.trim().is_empty()))
    }
}

/// Writes the banner and the end-of-run summary.
pub struct Summary<W: Write = io::Stdout> {
    writer: W,
}

impl Summary<io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl<W: Write> Summary<W> {
    #[cfg(test)]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn banner(&mut self, title: &str, target: &Path) -> io::Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style(format!("  {title}")).bold().cyan())?;
        writeln!(self.writer, "  Target: {}", style(target.display()).green())?;
        writeln!(self.writer)
    }

    pub fn success(&mut self, report: &DeployReport) -> io::Result<()> {
        writeln!(self.writer, "{} Deployment complete", style("✓").green().bold())?;
        self.details(report)
    }

    pub fn failure(&mut self, failure: &DeployFailure) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} Deployment failed during {}: {}",
            style("✗").red().bold(),
            failure.step,
            failure.error
        )?;
        self.details(&failure.report)?;
        if let Some(snapshot) = &failure.report.snapshot {
            writeln!(
                self.writer,
                "  Restore with: depot restore --snapshot {}",
                snapshot.display()
            )?;
        }
        Ok(())
    }

    fn details(&mut self, report: &DeployReport) -> io::Result<()> {
        if let (Some(path), Some(source)) = (&report.artifact, &report.provenance) {
            writeln!(self.writer, "  Package:  {} ({source})", path.display())?;
        } else if let Some(path) = &report.artifact {
            writeln!(self.writer, "  Package:  {}", path.display())?;
        }
        match (&report.snapshot, report.backup_skipped) {
            (Some(snapshot), _) => writeln!(self.writer, "  Backup:   {}", snapshot.display())?,
            (None, true) => writeln!(self.writer, "  Backup:   skipped (new target)")?,
            (None, false) => {}
        }
        if let Some(outcome) = &report.stop {
            writeln!(self.writer, "  Stop:     {}", describe(outcome))?;
        }
        if let Some(outcome) = &report.start {
            writeln!(self.writer, "  Start:    {}", describe(outcome))?;
        }
        if report.files_written > 0 {
            writeln!(self.writer, "  Files:    {}", report.files_written)?;
        }
        if let Some(digest) = &report.digest {
            writeln!(self.writer, "  Digest:   {}", &digest[..16.min(digest.len())])?;
        }
        for warning in &report.warnings {
            writeln!(self.writer, "  {} {warning}", style("⚠").yellow())?;
        }
        Ok(())
    }
}

fn describe(outcome: &ServiceOutcome) -> String {
    match outcome {
        ServiceOutcome::Completed { code: Some(0), .. } => "ok".to_string(),
        ServiceOutcome::Completed { code: Some(code), .. } => format!("exit code {code}"),
        ServiceOutcome::Completed { code: None, .. } => "terminated by signal".to_string(),
        ServiceOutcome::Unavailable(reason) => format!("skipped ({reason})"),
    }
}
