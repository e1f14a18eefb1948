use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use rail_sim::simulation::SimWorld;

#[derive(Parser)]
#[command(name = "rail_sim")]
#[command(about = "Headless rail traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "300")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Seed for the demo scenario's random throttles
    #[arg(long)]
    seed: Option<u64>,

    /// Number of trains placed on the demo layout
    #[arg(long, default_value = "3")]
    trains: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation without any rendering
fn run_headless(cli: &Cli) -> Result<()> {
    println!("Running rail simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / cli.delta).ceil().max(1.0) as u32;
    println!();

    let mut world = SimWorld::create_demo_world(cli.seed, cli.trains)?;

    println!("Initial state:");
    world.print_summary();
    println!();

    let mut tick = 0;
    while tick < cli.ticks {
        let ticks_to_run = ticks_per_second.min(cli.ticks - tick);

        for _ in 0..ticks_to_run {
            tick += 1;
            let report = world.tick(cli.delta);
            for accident in &report.accidents {
                warn!("tick {}: {}", tick, accident);
            }
            world.draw();
        }

        println!(
            "--- After tick {} ({:.1}s simulated time) ---",
            tick,
            tick as f32 * cli.delta
        );
        world.print_summary();
        println!();
    }

    println!("=== Final State ===");
    world.print_summary();
    if let Some(mission) = world.mission() {
        info!("{} finished", mission.name());
    }
    world.stats.log_summary();
    Ok(())
}
