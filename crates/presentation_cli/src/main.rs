//! OSM CLI
//!
//! Command-line access to the OSM client: building and boundary lookups,
//! client health and Overpass QL previews.

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use domain::{BBox, OsmElementType, Point};
use infrastructure::{
    AppConfig, BoundariesRepository, BoundarySearchConfig, BuildingQueryConfig,
    BuildingsRepository, create_osm_client, init_tracing,
};
use serde::Serialize;
use tracing::debug;

/// OSM CLI
#[derive(Debug, Parser)]
#[command(name = "osm-cli")]
#[command(author, version, about = "Query OpenStreetMap data via Overpass", long_about = None)]
struct Cli {
    /// Verbosity level (overrides the configured log filter)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to ./osm.toml when present)
    #[arg(short, long, env = "OSM_CONFIG")]
    config: Option<PathBuf>,

    /// Log OSM operations at debug level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Buildings inside a bounding box, as GeoJSON
    ///
    /// Example: osm-cli buildings --bbox 40.60,22.93,40.61,22.95 --include house
    Buildings {
        /// south,west,north,east
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BBox,

        /// Only these building types (comma-separated)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Drop these building types (comma-separated)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Keep at most this many buildings
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Buildings within a radius of a point, nearest first
    Near {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Radius in meters
        #[arg(long, default_value = "100")]
        radius: f64,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// A single building by way or relation id
    Building {
        id: i64,

        /// Element type: way or relation
        #[arg(long = "type", default_value = "way", value_parser = parse_element_type)]
        element_type: OsmElementType,
    },

    /// Administrative boundary lookups
    #[command(subcommand)]
    Boundaries(BoundaryCommands),

    /// Server circuit states, request metrics and cache statistics
    Health,

    /// Print the Overpass QL a buildings lookup would send, without sending it
    QueryPreview {
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: BBox,

        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum BoundaryCommands {
    /// Search boundaries by name (Greek or English)
    ///
    /// Example: osm-cli boundaries search Θεσσαλονίκη --levels 7,8
    Search {
        name: String,

        /// Admin levels to search (comma-separated)
        #[arg(long, value_delimiter = ',')]
        levels: Vec<u8>,

        /// Match the name exactly instead of case-insensitively
        #[arg(long)]
        exact: bool,

        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BBox>,

        /// Print the Overpass QL instead of running it
        #[arg(long)]
        preview: bool,
    },

    /// All boundaries of one admin level
    Level {
        level: u8,

        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BBox>,
    },

    /// Boundaries containing a point, lowest admin level first
    At {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        #[arg(long)]
        level: Option<u8>,
    },
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Parse `south,west,north,east`
fn parse_bbox(raw: &str) -> Result<BBox, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [south, west, north, east] = parts[..] else {
        return Err(format!(
            "expected south,west,north,east, got {} values",
            parts.len()
        ));
    };
    BBox::new(south, west, north, east).map_err(|e| e.to_string())
}

fn parse_element_type(raw: &str) -> Result<OsmElementType, String> {
    match raw.to_ascii_lowercase().as_str() {
        "way" => Ok(OsmElementType::Way),
        "relation" => Ok(OsmElementType::Relation),
        other => Err(format!("expected way or relation, got {other:?}")),
    }
}

fn search_config(levels: Vec<u8>, exact: bool, bbox: Option<BBox>) -> BoundarySearchConfig {
    let mut config = BoundarySearchConfig {
        exact,
        bbox,
        ..Default::default()
    };
    if !levels.is_empty() {
        config.admin_levels = levels;
    }
    config
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config =
        AppConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(filter) = log_filter_from_verbosity(cli.verbose) {
        config.telemetry.log_filter = filter.to_string();
    }
    config.osm.debug |= cli.debug;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.telemetry, config.osm.debug)?;

    // Query previews never touch the network.
    match &cli.command {
        Commands::QueryPreview { bbox, include } => {
            let building_config = BuildingQueryConfig {
                include_types: include.clone(),
                ..Default::default()
            };
            println!("{}", BuildingsRepository::bbox_query(bbox, &building_config)?);
            return Ok(());
        },
        Commands::Boundaries(BoundaryCommands::Search {
            name,
            levels,
            exact,
            bbox,
            preview: true,
        }) => {
            let search = search_config(levels.clone(), *exact, *bbox);
            println!("{}", BoundariesRepository::search_query(name, &search)?);
            return Ok(());
        },
        _ => {},
    }

    let client = create_osm_client(config.osm)?;
    debug!(command = ?cli.command, "Running command");

    match cli.command {
        Commands::Buildings {
            bbox,
            include,
            exclude,
            limit,
        } => {
            let query = BuildingQueryConfig {
                include_types: include,
                exclude_types: exclude,
                max_results: limit,
                ..Default::default()
            };
            let buildings = client.buildings().find_in_bbox(&bbox, &query).await?;
            print_json(&buildings.to_geojson()?)?;
        },

        Commands::Near {
            lat,
            lng,
            radius,
            limit,
        } => {
            let query = BuildingQueryConfig {
                max_results: limit,
                ..Default::default()
            };
            let buildings = client
                .buildings()
                .find_near_point(Point::new(lat, lng)?, radius, &query)
                .await?;
            print_json(&buildings.to_geojson()?)?;
        },

        Commands::Building { id, element_type } => {
            match client.buildings().find_by_id(id, element_type).await? {
                Some(building) => print_json(&building.to_geojson()?)?,
                None => anyhow::bail!("{element_type}/{id} not found"),
            }
        },

        Commands::Boundaries(BoundaryCommands::Search {
            name,
            levels,
            exact,
            bbox,
            ..
        }) => {
            let search = search_config(levels, exact, bbox);
            let boundaries = client.boundaries().search_by_name(&name, &search).await?;
            print_json(&boundaries.to_geojson()?)?;
        },

        Commands::Boundaries(BoundaryCommands::Level { level, bbox }) => {
            let boundaries = client.boundaries().find_by_admin_level(level, bbox).await?;
            print_json(&boundaries.to_geojson()?)?;
        },

        Commands::Boundaries(BoundaryCommands::At { lat, lng, level }) => {
            let boundaries = client
                .boundaries()
                .find_containing_point(Point::new(lat, lng)?, level)
                .await?;
            print_json(&boundaries.to_geojson()?)?;
        },

        Commands::Health => {
            print_json(&client.get_health())?;
        },

        Commands::QueryPreview { .. } => {},
    }

    client.destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_overrides_filter() {
        assert_eq!(log_filter_from_verbosity(0), None);
        assert_eq!(log_filter_from_verbosity(1), Some("info"));
        assert_eq!(log_filter_from_verbosity(2), Some("debug"));
        assert_eq!(log_filter_from_verbosity(5), Some("trace"));
    }

    #[test]
    fn bbox_argument_parses() {
        let bbox = parse_bbox("40.60, 22.93,40.61,22.95").unwrap();
        assert_eq!(bbox, BBox::new(40.60, 22.93, 40.61, 22.95).unwrap());

        assert!(parse_bbox("40.60,22.93,40.61").is_err());
        assert!(parse_bbox("40.60,x,40.61,22.95").is_err());
        assert!(parse_bbox("41,22.93,40,22.95").is_err());
    }

    #[test]
    fn element_type_argument() {
        assert_eq!(parse_element_type("Way"), Ok(OsmElementType::Way));
        assert_eq!(parse_element_type("relation"), Ok(OsmElementType::Relation));
        assert!(parse_element_type("node").is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "osm-cli",
            "-vv",
            "boundaries",
            "search",
            "Θεσσαλονίκη",
            "--levels",
            "7,8",
            "--exact",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Boundaries(BoundaryCommands::Search {
            name,
            levels,
            exact,
            preview,
            ..
        }) = cli.command
        else {
            panic!("expected boundaries search");
        };
        assert_eq!(name, "Θεσσαλονίκη");
        assert_eq!(levels, vec![7, 8]);
        assert!(exact);
        assert!(!preview);

        let cli = Cli::try_parse_from(["osm-cli", "near", "--lat", "-33.9", "--lng", "18.4"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Near { lat, radius, .. } if lat == -33.9 && radius == 100.0
        ));
    }

    #[test]
    fn empty_levels_keep_defaults() {
        let config = search_config(Vec::new(), false, None);
        assert_eq!(config.admin_levels, infrastructure::DEFAULT_ADMIN_LEVELS.to_vec());
        assert_eq!(search_config(vec![8], true, None).admin_levels, vec![8]);
    }
}
