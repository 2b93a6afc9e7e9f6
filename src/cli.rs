use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use photo_vault::PhotoCategory;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coachbook", version)]
#[command(about = "Client photos for fitness coaches", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// App data directory (config, database, photo cache)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a client
    AddClient { name: String },

    /// List registered clients
    Clients,

    /// Store a photo for a client
    Upload {
        /// Client uuid
        client: String,
        /// profile, progress or weight-check
        category: PhotoCategory,
        /// Image file
        file: PathBuf,
        #[arg(short, long)]
        notes: Option<String>,
        /// Capture date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the best reference for a photo
    Get { identity: String },

    /// Save the best available copy of a photo to a file
    Fetch {
        identity: String,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the photos of a client
    List {
        client: String,
        #[arg(short, long)]
        category: Option<PhotoCategory>,
    },

    /// Delete a photo
    Delete { identity: String },

    /// Delete a client and all of its photos
    DeleteClient { client: String },

    /// Upload photos taken on this device that never reached a remote host
    Replicate {
        /// Only this client's photos
        #[arg(long)]
        client: Option<String>,
    },

    /// Remove orphaned remote objects and retry failed deletes
    Sweep {
        /// Only touch uploads started at least this many minutes ago
        #[arg(long, default_value_t = 60)]
        older_than_minutes: i64,
    },

    /// Print this install's device id
    DeviceId,

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::parse_from([
            "coachbook",
            "upload",
            "c-1",
            "weight-check",
            "photo.jpg",
            "--notes",
            "post-workout",
            "--date",
            "2025-04-02",
        ]);
        match cli.command {
            Commands::Upload {
                client,
                category,
                file,
                notes,
                date,
            } => {
                assert_eq!(client, "c-1");
                assert_eq!(category, PhotoCategory::WeightCheck);
                assert_eq!(file, PathBuf::from("photo.jpg"));
                assert_eq!(notes.as_deref(), Some("post-workout"));
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 4, 2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let result = Cli::try_parse_from(["coachbook", "upload", "c-1", "selfie", "a.jpg"]);
        assert!(result.is_err());
    }
}
