//! Simulate command implementation.

use pagesync_client::{ClientConfig, ReplicaStats};
use pagesync_server::{AuthorityStats, PushMode, ServerConfig};
use pagesync_testkit::{converge_replica, LoopbackNetwork, PageOp, TestUnit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

/// Revalidation rounds allowed once mutations stop.
const MAX_CONVERGE_ROUNDS: usize = 4;

/// Parameters of a simulated session.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of distinct pages mutated.
    pub pages: u64,
    /// Number of distinct item indices per page.
    pub items: u32,
    /// Number of mutation rounds.
    pub rounds: usize,
    /// Number of replicas.
    pub replicas: usize,
    /// Seed for the random generator.
    pub seed: u64,
    /// Probability that a replica loses the pushes of a round.
    pub push_loss: f64,
    /// Coalesce pushes and flush once per round.
    pub batched: bool,
    /// Largest index list per data-diff request.
    pub max_request: usize,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Seed used.
    pub seed: u64,
    /// Mutation rounds run.
    pub rounds: usize,
    /// Mutations applied to the authority.
    pub mutations: usize,
    /// Pages left on the authority.
    pub authority_pages: usize,
    /// Authority counters.
    pub authority: AuthorityReport,
    /// Per-replica outcome.
    pub replicas: Vec<ReplicaReport>,
}

/// Authority counters.
#[derive(Debug, Serialize)]
pub struct AuthorityReport {
    /// Pushes broadcast.
    pub pushes_broadcast: u64,
    /// Push sends that failed.
    pub push_failures: u64,
    /// Checksum queries served.
    pub checksum_requests_served: u64,
    /// Data-diff queries served.
    pub diff_requests_served: u64,
    /// Requests rejected.
    pub requests_rejected: u64,
}

/// Outcome for one replica.
#[derive(Debug, Serialize)]
pub struct ReplicaReport {
    /// Replica position.
    pub replica: usize,
    /// Pushes discarded in transit.
    pub pushes_lost: usize,
    /// Revalidation rounds needed at the end, if it converged.
    pub converged_after: Option<usize>,
    /// Checksum requests sent.
    pub checksum_requests: u64,
    /// Data-diff requests sent.
    pub diff_requests: u64,
    /// Pooling calls served from cache.
    pub cache_hits: u64,
    /// Pages evicted.
    pub purges: u64,
    /// Packets dropped.
    pub packets_dropped: u64,
}

impl From<&AuthorityStats> for AuthorityReport {
    fn from(stats: &AuthorityStats) -> Self {
        Self {
            pushes_broadcast: stats.pushes_broadcast,
            push_failures: stats.push_failures,
            checksum_requests_served: stats.checksum_requests_served,
            diff_requests_served: stats.diff_requests_served,
            requests_rejected: stats.requests_rejected,
        }
    }
}

impl ReplicaReport {
    fn new(
        replica: usize,
        pushes_lost: usize,
        converged_after: Option<usize>,
        stats: &ReplicaStats,
    ) -> Self {
        Self {
            replica,
            pushes_lost,
            converged_after,
            checksum_requests: stats.checksum_requests,
            diff_requests: stats.diff_requests,
            cache_hits: stats.cache_hits,
            purges: stats.purges,
            packets_dropped: stats.packets_dropped,
        }
    }
}

fn random_op(rng: &mut StdRng, options: &SimulateOptions) -> PageOp {
    let page = rng.gen_range(0..options.pages);
    let index = rng.gen_range(0..options.items);
    match rng.gen_range(0..10) {
        0 => PageOp::RemovePage { page },
        1..=2 => PageOp::Remove { page, index },
        _ => PageOp::Set {
            page,
            index,
            unit: TestUnit::new(rng.gen(), format!("p{page}i{index}")),
        },
    }
}

/// Runs a session and returns its report.
pub fn simulate(options: &SimulateOptions) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    if options.pages == 0 || options.items == 0 {
        return Err("pages and items must be at least 1".into());
    }
    if !(0.0..=1.0).contains(&options.push_loss) {
        return Err(format!("push loss {} is not a probability", options.push_loss).into());
    }

    let mode = if options.batched {
        PushMode::Batched
    } else {
        PushMode::Immediate
    };
    let server_config = ServerConfig::new("simulation")
        .with_push_mode(mode)
        .with_max_request_indices(options.max_request);
    let mut network = LoopbackNetwork::<TestUnit>::new(server_config);
    for _ in 0..options.replicas {
        network.add_replica(
            ClientConfig::new("simulation").with_max_indices_per_request(options.max_request),
        );
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut mutations = 0;
    let mut pushes_lost = vec![0; options.replicas];

    for round in 0..options.rounds {
        for _ in 0..rng.gen_range(1..=4) {
            random_op(&mut rng, options).apply(network.authority());
            mutations += 1;
        }
        network.authority().flush_notifications();

        for (r, lost) in pushes_lost.iter_mut().enumerate() {
            if rng.gen_bool(options.push_loss) {
                *lost += network.drop_pushes(r);
            }
            let page = rng.gen_range(0..options.pages);
            network.replica(r).try_pool_data_update(page);
        }
        let moved = network.deliver_all();
        debug!(round, moved, "round delivered");
    }

    let replicas = pushes_lost
        .iter()
        .enumerate()
        .map(|(r, lost)| {
            let converged = converge_replica(&network, r, MAX_CONVERGE_ROUNDS);
            ReplicaReport::new(r, *lost, converged, &network.replica(r).stats())
        })
        .collect();

    let report = SimulationReport {
        seed: options.seed,
        rounds: options.rounds,
        mutations,
        authority_pages: network.authority().page_count(),
        authority: AuthorityReport::from(&network.authority().stats()),
        replicas,
    };
    info!(mutations, replicas = options.replicas, "simulation finished");
    Ok(report)
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = simulate(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    let diverged: Vec<usize> = report
        .replicas
        .iter()
        .filter(|r| r.converged_after.is_none())
        .map(|r| r.replica)
        .collect();
    if !diverged.is_empty() {
        return Err(format!("replicas {:?} did not converge", diverged).into());
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!("=== Simulation (seed {}) ===", report.seed);
    println!();
    println!("Rounds:          {}", report.rounds);
    println!("Mutations:       {}", report.mutations);
    println!("Authority pages: {}", report.authority_pages);
    println!(
        "Pushes:          {} broadcast, {} failed",
        report.authority.pushes_broadcast, report.authority.push_failures
    );
    println!(
        "Requests served: {} checksum, {} diff, {} rejected",
        report.authority.checksum_requests_served,
        report.authority.diff_requests_served,
        report.authority.requests_rejected
    );
    println!();
    println!(
        "{:>8}  {:>10}  {:>9}  {:>8}  {:>10}  {:>7}  {:>7}",
        "replica", "converged", "checksum", "diff", "cache hits", "purges", "lost"
    );
    for r in &report.replicas {
        let converged = match r.converged_after {
            Some(rounds) => format!("yes ({rounds})"),
            None => "NO".to_string(),
        };
        println!(
            "{:>8}  {:>10}  {:>9}  {:>8}  {:>10}  {:>7}  {:>7}",
            r.replica,
            converged,
            r.checksum_requests,
            r.diff_requests,
            r.cache_hits,
            r.purges,
            r.pushes_lost
        );
    }
}
