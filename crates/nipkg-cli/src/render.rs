use std::env;
use std::io::{self, IsTerminal};

use anstyle::{AnsiColor, Effects, Style};
use nipkg_core::PackageError;
use nipkg_installer::{InstallOutcome, UninstallOutcome};
use nipkg_registry::PackageMetadata;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn current() -> Self {
        Self {
            style: current_output_style(),
        }
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        let rendered = match self.style {
            OutputStyle::Plain => title.to_string(),
            OutputStyle::Rich => colorize(section_style(), title),
        };
        println!("{rendered}");
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

fn current_output_style() -> OutputStyle {
    output_style_for(io::stdout().is_terminal(), no_color())
}

/// Style for messages written to stderr, which may be redirected on its own.
pub(crate) fn current_error_style() -> OutputStyle {
    output_style_for(io::stderr().is_terminal(), no_color())
}

fn no_color() -> bool {
    env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = status_badge(status);
            format!("{} {message}", colorize(status_style(status), badge))
        }
    }
}

pub(crate) fn render_package_error(style: OutputStyle, err: &PackageError) -> String {
    let label = format!("error[{}]", err.code());
    match style {
        OutputStyle::Plain => format!("{label}: {err}"),
        OutputStyle::Rich => format!("{}: {err}", colorize(status_style("error"), &label)),
    }
}

pub(crate) fn format_install_outcome(outcome: &InstallOutcome) -> String {
    match outcome.previous_version.as_deref() {
        Some(previous) if previous != outcome.version => format!(
            "updated {} {} -> {} ({} files)",
            outcome.package_id, previous, outcome.version, outcome.files
        ),
        Some(_) => format!(
            "reinstalled {} {} ({} files)",
            outcome.package_id, outcome.version, outcome.files
        ),
        None => format!(
            "installed {} {} ({} files)",
            outcome.package_id, outcome.version, outcome.files
        ),
    }
}

pub(crate) fn format_uninstall_outcome(outcome: &UninstallOutcome) -> String {
    match outcome.version.as_deref() {
        Some(version) => format!("uninstalled {} {version}", outcome.package_id),
        None => format!("uninstalled {}", outcome.package_id),
    }
}

pub(crate) fn format_package_lines(packages: &[PackageMetadata]) -> Vec<String> {
    if packages.is_empty() {
        return vec!["no packages installed".to_string()];
    }

    packages
        .iter()
        .map(|package| {
            let mut line = format!(
                "{} {}",
                package.id,
                package.version.as_deref().unwrap_or("-")
            );
            if let Some(pending) = package.pending_version.as_deref() {
                line.push_str(&format!(" -> {pending}"));
            }
            line.push_str(&format!(" [{}]", package.state));
            if let Some(title) = package.title.as_deref() {
                line.push_str(&format!("  {title}"));
            }
            line
        })
        .collect()
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "error" => "[ERR]",
        _ => "[..]",
    }
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "error" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlack,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
