use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use prism_core::models::FieldType;
use prism_core::Collection;

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Manage contacts offline and sync them when a connection is available")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Keep every change local; nothing is sent to the remote
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, list, edit and delete contacts
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },
    /// Manage contact groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
    /// Declare custom contact fields
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Push queued changes, optionally pulling remote records afterwards
    Sync {
        /// Also refresh local copies from the remote
        #[arg(long)]
        pull: bool,
        /// Pull even when the local copies are fresh
        #[arg(long, requires = "pull")]
        force: bool,
    },
    /// Inspect the sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Print a collection every time it changes
    Watch {
        #[arg(value_enum)]
        collection: WatchTarget,
        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ContactFields {
    /// Last name
    #[arg(long)]
    pub last_name: Option<String>,
    /// Phone number (repeatable)
    #[arg(long = "phone", value_name = "NUMBER")]
    pub phones: Vec<String>,
    /// Email address; an empty value clears it on edit
    #[arg(long)]
    pub email: Option<String>,
    /// Free-form notes; an empty value clears them on edit
    #[arg(long)]
    pub notes: Option<String>,
    /// Group ID (repeatable)
    #[arg(long = "group", value_name = "ID")]
    pub groups: Vec<String>,
    /// Custom field value as KEY=VALUE (repeatable)
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

#[derive(Subcommand)]
pub enum ContactCommands {
    /// Create a new contact
    #[command(alias = "new")]
    Add {
        first_name: String,
        #[command(flatten)]
        fields: ContactFields,
    },
    /// List contacts
    List {
        /// Only names starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Number of contacts to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing contact
    Edit {
        /// Contact ID or unique ID prefix
        id: String,
        #[arg(long)]
        first_name: Option<String>,
        #[command(flatten)]
        fields: ContactFields,
    },
    /// Delete a contact
    Delete {
        /// Contact ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a new group
    Add {
        name: String,
        /// Display color, e.g. #3366ff
        #[arg(long)]
        color: Option<String>,
    },
    /// List groups
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a group
    Delete {
        /// Group ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Declare a custom field
    Add {
        /// Key referenced from contacts
        key: String,
        /// Label shown to users
        label: String,
        #[arg(long = "type", value_enum, default_value_t = FieldTypeArg::Text)]
        field_type: FieldTypeArg,
        /// Choice for list fields (repeatable)
        #[arg(long = "option", value_name = "VALUE")]
        options: Vec<String>,
    },
    /// List declared custom fields
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a custom field declaration
    Delete {
        /// Schema ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued changes
    List {
        /// Only parked items
        #[arg(long)]
        failed: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue parked items
    Retry {
        /// Queue item number; all parked items when omitted
        id: Option<i64>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FieldTypeArg {
    Text,
    Number,
    Date,
    List,
}

impl From<FieldTypeArg> for FieldType {
    fn from(value: FieldTypeArg) -> Self {
        match value {
            FieldTypeArg::Text => Self::Text,
            FieldTypeArg::Number => Self::Number,
            FieldTypeArg::Date => Self::Date,
            FieldTypeArg::List => Self::List,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum WatchTarget {
    Contacts,
    Groups,
    Schemas,
}

impl From<WatchTarget> for Collection {
    fn from(value: WatchTarget) -> Self {
        match value {
            WatchTarget::Contacts => Self::Contacts,
            WatchTarget::Groups => Self::Groups,
            WatchTarget::Schemas => Self::CustomFieldSchemas,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
