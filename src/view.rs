//! Step cards, badges and icons derived from the status model.
//!
//! Everything here is a pure function of a [`Run`]; nothing is cached.

use std::{fmt::Write as _, io::IsTerminal};

use crate::{
    identifiers::RunId,
    types::{Run, Step, StepName, StepStatus},
};

/// Line shown for a step that has neither a summary nor an error.
pub const WAITING: &str = "Waiting...";

/// Badge color family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadgeTone {
    Slate,
    Amber,
    Emerald,
    Rose,
}

impl BadgeTone {
    /// Unknown statuses share the queued look.
    pub fn for_status(status: &StepStatus) -> Self {
        match status {
            StepStatus::Running => BadgeTone::Amber,
            StepStatus::Success => BadgeTone::Emerald,
            StepStatus::Failed => BadgeTone::Rose,
            StepStatus::Queued | StepStatus::Unrecognized(_) => BadgeTone::Slate,
        }
    }

    /// Utility classes for web front ends.
    pub fn css_class(&self) -> &'static str {
        match self {
            BadgeTone::Slate => "bg-slate-800 text-slate-200",
            BadgeTone::Amber => "bg-amber-500/20 text-amber-200",
            BadgeTone::Emerald => "bg-emerald-500/20 text-emerald-200",
            BadgeTone::Rose => "bg-rose-500/20 text-rose-200",
        }
    }

    /// 256-color palette index for terminals.
    pub fn ansi_code(&self) -> u8 {
        match self {
            BadgeTone::Slate => 250,
            BadgeTone::Amber => 214,
            BadgeTone::Emerald => 78,
            BadgeTone::Rose => 204,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepIcon {
    Spinner,
    Check,
    Alert,
    Refresh,
}

impl StepIcon {
    pub fn for_status(status: &StepStatus) -> Self {
        match status {
            StepStatus::Running => StepIcon::Spinner,
            StepStatus::Success => StepIcon::Check,
            StepStatus::Failed => StepIcon::Alert,
            StepStatus::Queued | StepStatus::Unrecognized(_) => StepIcon::Refresh,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            StepIcon::Spinner => "◐",
            StepIcon::Check => "✔",
            StepIcon::Alert => "✖",
            StepIcon::Refresh => "↻",
        }
    }
}

/// Everything needed to draw one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCard {
    pub name: StepName,
    pub label: String,
    pub icon: StepIcon,
    pub tone: BadgeTone,
    pub line: String,
}

impl StepCard {
    pub fn derive(name: StepName, step: Option<&Step>) -> Self {
        let default_status = StepStatus::Queued;
        let status = step.map_or(&default_status, |s| &s.status);
        let label = match status.as_str().trim() {
            "" => StepStatus::Queued.as_str().to_string(),
            raw => raw.to_string(),
        };
        let line = step
            .and_then(|s| non_blank(&s.summary).or_else(|| non_blank(&s.error)))
            .unwrap_or(WAITING)
            .to_string();

        Self {
            name,
            label,
            icon: StepIcon::for_status(status),
            tone: BadgeTone::for_status(status),
            line,
        }
    }
}

fn non_blank(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.trim().is_empty())
}

/// The pipeline panel: five cards in fixed order plus the download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunView {
    pub run_id: Option<RunId>,
    pub cards: Vec<StepCard>,
    pub download_url: Option<String>,
}

impl RunView {
    /// Without a run every card reads as queued and no link is offered.
    pub fn derive(run: Option<&Run>, download_url: Option<String>) -> Self {
        let cards = StepName::ORDER
            .into_iter()
            .map(|name| StepCard::derive(name, run.and_then(|r| r.step(name))))
            .collect();
        Self {
            run_id: run.map(|r| r.id.clone()),
            cards,
            download_url: run.and(download_url),
        }
    }

    pub fn card(&self, name: StepName) -> Option<&StepCard> {
        self.cards.iter().find(|card| card.name == name)
    }

    /// Plain-text rendering, with ANSI colors when `color` is set.
    pub fn render(&self, color: bool) -> String {
        let mut out = String::new();
        match &self.run_id {
            Some(id) => {
                let _ = writeln!(out, "{}", paint(&format!("Run {id}"), HEADER, color));
            }
            None => {
                let _ = writeln!(out, "{}", paint("No run selected", MUTED, color));
            }
        }
        for card in &self.cards {
            let badge = paint(&format!("[{}]", card.label), card.tone.ansi_code(), color);
            let _ = writeln!(
                out,
                "{} {:<10} {}  {}",
                paint(card.icon.glyph(), card.tone.ansi_code(), color),
                card.name.title(),
                badge,
                paint(&card.line, MUTED, color),
            );
        }
        if let Some(url) = &self.download_url {
            let _ = writeln!(out, "Download: {url}");
        }
        out
    }
}

const HEADER: u8 = 74;
const MUTED: u8 = 245;
const RESET: &str = "\x1b[0m";

/// Whether terminal output should carry colors.
///
/// `NO_COLOR=1` disables, then `COLOR=1` forces, then stdout must be a TTY.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Wrap `text` in a 256-color foreground code.
pub fn paint(text: &str, code: u8, color: bool) -> String {
    if color {
        format!("\x1b[38;5;{code}m{text}{RESET}")
    } else {
        text.to_string()
    }
}
