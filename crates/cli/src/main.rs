use carescore_core::{
    bootstrap_store, CoreConfig, PlanCatalogService, RecommendationService, RiskService,
    SimilarityService, WeightOverrides,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "carescore")]
#[command(about = "CareScore patient risk and insurance recommendation CLI")]
struct Cli {
    /// FHIR bundle JSON (Bundle or bare resource array) to load
    #[arg(long)]
    bundle: Option<PathBuf>,
    /// YAML plan catalog (built-in plans otherwise)
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a patient with the default weights
    Risk { patient_id: String },
    /// What-if score with custom weights (never stored)
    Simulate {
        patient_id: String,
        #[arg(long)]
        age: Option<f64>,
        #[arg(long)]
        conditions: Option<f64>,
        #[arg(long)]
        observations: Option<f64>,
        #[arg(long)]
        medications: Option<f64>,
    },
    /// Find patients similar to the given patient
    Similar { patient_id: String },
    /// Cheapest plan covering the patient's active conditions
    Recommend { patient_id: String },
    /// Plans suited to the patient's risk tier
    Insurance { patient_id: String },
    /// List the plan catalog
    Plans,
    /// Show one catalog plan
    Plan { plan_id: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carescore_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = Arc::new(
        CoreConfig::default()
            .with_bundle(cli.bundle)
            .with_plan_catalog(cli.catalog),
    );
    let store = bootstrap_store(&cfg)?;

    match cli.command {
        Commands::Risk { patient_id } => {
            let assessment = RiskService::new(store).compute_risk(&patient_id)?;
            print_json(&assessment)?;
        }
        Commands::Simulate {
            patient_id,
            age,
            conditions,
            observations,
            medications,
        } => {
            let weights = WeightOverrides {
                age,
                conditions,
                observations,
                medications,
            }
            .resolve()?;
            let assessment = RiskService::new(store).simulate_risk(&patient_id, &weights)?;
            print_json(&assessment)?;
        }
        Commands::Similar { patient_id } => {
            let cohort = SimilarityService::new(store, cfg).find_similar_patients(&patient_id)?;
            print_json(&cohort)?;
        }
        Commands::Recommend { patient_id } => {
            let rec = RecommendationService::new(store, cfg)
                .get_coverage_recommendation(&patient_id)?;
            print_json(&rec)?;
        }
        Commands::Insurance { patient_id } => {
            let rec = RecommendationService::new(store, cfg)
                .get_insurance_recommendation(&patient_id)?;
            print_json(&rec)?;
        }
        Commands::Plans => {
            print_json(&PlanCatalogService::new(store).plans()?)?;
        }
        Commands::Plan { plan_id } => match PlanCatalogService::new(store).plan(&plan_id)? {
            Some(plan) => print_json(&plan)?,
            None => anyhow::bail!("insurance plan not found: {plan_id}"),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_parses_weight_flags() {
        let cli = Cli::try_parse_from([
            "carescore",
            "--bundle",
            "bundle.json",
            "simulate",
            "p001",
            "--age",
            "10",
            "--medications",
            "5",
        ])
        .expect("parse");
        assert_eq!(cli.bundle, Some(PathBuf::from("bundle.json")));
        match cli.command {
            Commands::Simulate {
                patient_id,
                age,
                conditions,
                medications,
                ..
            } => {
                assert_eq!(patient_id, "p001");
                assert_eq!(age, Some(10.0));
                assert_eq!(conditions, None);
                assert_eq!(medications, Some(5.0));
            }
            _ => panic!("expected simulate"),
        }
    }
}
