use std::fmt::Display;
use std::io::IsTerminal;

use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Plain,
}

pub struct Ui {
    palette: Palette,
    paint: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let paint = match theme {
            Theme::Plain => false,
            Theme::Auto => std::io::stdout().is_terminal(),
        };

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = if paint {
            Palette::dark()
        } else {
            Palette::plain()
        };
        Self { palette, paint }
    }

    pub fn section<I, K, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Display,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            if self.paint {
                println!(
                    "  {} {}",
                    self.palette.key.paint(format!("{key:>key_width$}:")),
                    self.palette.value.paint(value)
                );
            } else {
                println!("  {key:>key_width$}: {value}");
            }
        }
    }

    /// Prints SQL text verbatim, coloured as one block.
    pub fn sql(&self, sql: &str) {
        self.heading("SQL");
        for line in sql.lines() {
            if self.paint {
                println!("  {}", self.palette.sql.paint(line));
            } else {
                println!("  {line}");
            }
        }
    }

    /// One identity per line, undecorated so the output pipes cleanly.
    pub fn identities<I>(&self, identities: I)
    where
        I: IntoIterator<Item = String>,
    {
        for identity in identities {
            if self.paint {
                println!("{}", self.palette.value.paint(identity));
            } else {
                println!("{identity}");
            }
        }
    }

    pub fn success(&self, message: &str) {
        if self.paint {
            println!("{} {message}", self.palette.success.paint(SUCCESS_ICON));
        } else {
            println!("{SUCCESS_ICON} {message}");
        }
    }

    fn heading(&self, title: &str) {
        let formatted = format!("{HEADING_ICON} {title}");
        if self.paint {
            println!("{}", self.palette.heading.paint(formatted));
        } else {
            println!("{formatted}");
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";

struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    sql: Style,
    success: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            sql: Style::new().fg(Color::LightCyan),
            success: Style::new().fg(Color::LightGreen).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            value: Style::new(),
            sql: Style::new(),
            success: Style::new(),
        }
    }
}
