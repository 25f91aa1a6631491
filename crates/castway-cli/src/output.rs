//! Output formatting for CLI

use castway_core::ChannelEntry;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

/// Print `data` as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

#[derive(Tabled)]
struct EntryRow<'a> {
    #[tabled(rename = "ID")]
    id: &'a str,
    #[tabled(rename = "Name")]
    name: &'a str,
    #[tabled(rename = "Group")]
    group: &'a str,
    #[tabled(rename = "URL")]
    url: &'a str,
    #[tabled(rename = "UA")]
    user_agent: &'a str,
    #[tabled(rename = "Cookie")]
    cookie: &'a str,
}

impl<'a> From<&'a ChannelEntry> for EntryRow<'a> {
    fn from(entry: &'a ChannelEntry) -> Self {
        Self {
            id: &entry.id,
            name: &entry.name,
            group: entry.group_or_default(),
            url: &entry.url,
            user_agent: &entry.user_agent,
            cookie: if entry.cookie.is_some() { "yes" } else { "" },
        }
    }
}

/// Render channel entries in the requested format
pub fn print_entries(entries: &[&ChannelEntry], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(entries)?,
        OutputFormat::Table => {
            let mut table = Table::new(entries.iter().map(|e| EntryRow::from(*e)));
            table.with(Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Text => {
            for entry in entries {
                println!("[{}] {}", entry.group_or_default(), entry.name);
                println!("    {}", entry.url);
                if entry.has_custom_user_agent() {
                    println!("    user-agent: {}", entry.user_agent);
                }
                if let Some(referer) = &entry.referer {
                    println!("    referer: {}", referer);
                }
                if entry.cookie.is_some() {
                    println!("    cookie: set");
                }
            }
        }
    }
    Ok(())
}

/// Key/value rows for text and table output
pub fn print_fields(fields: &[(&str, String)], format: OutputFormat) {
    #[derive(Tabled)]
    struct FieldRow<'a> {
        #[tabled(rename = "Field")]
        field: &'a str,
        #[tabled(rename = "Value")]
        value: &'a str,
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new(fields.iter().map(|(field, value)| FieldRow { field, value }));
            table.with(Style::rounded());
            println!("{}", table);
        }
        _ => {
            let width = fields.iter().map(|(field, _)| field.len()).max().unwrap_or(0);
            for (field, value) in fields {
                println!("  {:width$}  {}", field, value, width = width);
            }
        }
    }
}
