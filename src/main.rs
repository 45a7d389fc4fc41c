use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gridmapf::config::{Algorithm, Cli, Params};
use gridmapf::solver::mapf;
use gridmapf::validator;
use gridmapf::yaml::ScenarioYaml;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let params = Params::from_cli(&cli);

    let scenario = ScenarioYaml::from_file(&cli.scenario)?
        .to_scenario(params.direction_change_frequency)
        .context("invalid scenario")?;

    info!(
        scenario = %cli.scenario,
        algorithm = ?params.algorithm,
        agents = scenario.agents.len(),
        tasks = scenario.tasks.len(),
        "planning"
    );

    let plan = mapf(&scenario, &params, &params.deadline())?;
    let Some(plan) = plan else {
        error!("no common plan found");
        std::process::exit(1);
    };

    let validation = match params.algorithm {
        Algorithm::TokenPassing => validator::validate_dynamic(&scenario, &plan),
        _ => validator::validate_classic(&scenario, &plan),
    };
    validation.context("planner produced an invalid common plan")?;

    info!(
        makespan = plan.makespan(),
        flowtime = plan.sum_of_costs(),
        "common plan found"
    );
    for agent_plan in plan.plans() {
        let route: Vec<String> = agent_plan
            .steps()
            .iter()
            .map(|step| format!("({},{})@{}", step.x, step.y, step.t))
            .collect();
        println!("agent{}: {}", agent_plan.agent, route.join(" "));
    }

    Ok(())
}
