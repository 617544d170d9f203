//! radio link simulation for piGateway

use anyhow::Result;
use colored::Colorize;
use pigateway_sim::{scenarios, SimulationPresets};

const NODES: u8 = 6;
const ROUNDS: usize = 50;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "piGateway Radio Simulation".bright_blue().bold());
    println!("{}", "==========================".bright_blue());
    println!();

    let test_scenarios = vec![
        ("Good Conditions", SimulationPresets::good_conditions()),
        ("Average Conditions", SimulationPresets::average_conditions()),
        ("Poor Conditions", SimulationPresets::poor_conditions()),
    ];

    for (i, (name, conditions)) in test_scenarios.into_iter().enumerate() {
        println!("{}", format!("\n>>> Testing: {}", name).bright_green().bold());
        println!("Packet Loss: {}%", (conditions.packet_loss * 100.0) as u32);
        println!("RSSI: {} dBm (sd {})", conditions.rssi_mean, conditions.rssi_stddev);
        println!("Truncated frames: {}%", (conditions.corrupt_rate * 100.0) as u32);
        println!();

        let report = scenarios::run_scenario(&conditions, NODES, ROUNDS, i as u64).await?;

        println!("  - frames generated: {}", report.frames_generated);
        println!("  - lost on air: {}", report.frames_lost);
        println!("  - malformed at gateway: {}", report.stats.frames_malformed);
        println!(
            "  - broker publishes: {} on {} topics",
            report.stats.publishes, report.distinct_topics
        );
        println!("  - acks / probes: {} / {}", report.acks, report.probes);
        println!(
            "  - commands: {} injected, {} sent over radio",
            report.commands_injected, report.command_frames
        );
        println!("  - delivery ratio: {:.1}%", report.delivery_ratio() * 100.0);

        println!("{}", "Test complete!".bright_yellow());
        println!("{}", "-".repeat(50));
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
