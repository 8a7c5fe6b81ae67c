//! Performance probe: synthetic micro-benchmarks and resource thresholds.

use super::{Probe, ProbeContext, ProbeKind, ValidationFragment};
use crate::host::{HostInspector, ResolvedEnvironment};
use sha2::{Digest, Sha256};
use std::fs;
use std::hint::black_box;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use syntropy_common::validation::{BenchmarkResult, PerformanceSection};
use syntropy_common::{Category, ProbeError, ValidationItem, ValidationRequest};
use tracing::{debug, warn};

/// Milliseconds per lost point, per benchmark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkWeights {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

impl Default for BenchmarkWeights {
    fn default() -> Self {
        Self {
            cpu: 10.0,
            memory: 5.0,
            disk: 2.0,
            network: 1.0,
        }
    }
}

/// `100 - duration/W`, clamped to [0, 100]
pub fn score(duration_ms: f64, weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    (100.0 - duration_ms / weight).clamp(0.0, 100.0)
}

/// Weighted mean of the four component scores
pub fn overall_score(cpu: f64, memory: f64, disk: f64, network: f64) -> f64 {
    0.30 * cpu + 0.25 * memory + 0.25 * disk + 0.20 * network
}

const LOW_SCORE: f64 = 50.0;
const OPTIMIZE_SCORE: f64 = 70.0;
const MIN_CPU_CORES: usize = 2;
const MIN_TOTAL_MEMORY_GB: f64 = 4.0;
const MIN_AVAILABLE_MEMORY_GB: f64 = 1.0;

const SIEVE_LIMIT: u32 = 10_000;
const MEMORY_BLOCKS: usize = 100;
const BLOCK_SIZE: usize = 1024 * 1024;
const DISK_BYTES: usize = 4 * 1024 * 1024;
const CONCURRENT_TASKS: usize = 10;
const DATA_POINTS: usize = 100_000;
const SIMULATED_RTT: Duration = Duration::from_millis(20);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(3);

pub struct PerformanceProbe {
    host: Arc<dyn HostInspector>,
    weights: BenchmarkWeights,
    network_target: Option<String>,
    scratch_dir: PathBuf,
}

impl PerformanceProbe {
    pub fn new(host: Arc<dyn HostInspector>) -> Self {
        Self {
            host,
            weights: BenchmarkWeights::default(),
            network_target: None,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Measure TCP connect RTT to `host:port` instead of simulating it
    pub fn with_network_target(mut self, target: Option<String>) -> Self {
        self.network_target = target;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn cpu(&self) -> BenchmarkResult {
        let started = Instant::now();
        let mut primes = 0u32;
        for n in 2..SIEVE_LIMIT {
            let mut d = 2;
            let mut prime = true;
            while d * d <= n {
                if n % d == 0 {
                    prime = false;
                    break;
                }
                d += 1;
            }
            if prime {
                primes += 1;
            }
        }
        black_box(primes);
        measured("cpu", started, self.weights.cpu)
    }

    fn memory(&self) -> BenchmarkResult {
        let started = Instant::now();
        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(MEMORY_BLOCKS);
        for i in 0..MEMORY_BLOCKS {
            let mut block = vec![0u8; BLOCK_SIZE];
            for (j, byte) in block.iter_mut().enumerate() {
                *byte = (i + j) as u8;
            }
            blocks.push(block);
        }
        black_box(&blocks);
        drop(blocks);
        measured("memory", started, self.weights.memory)
    }

    fn disk(&self) -> std::io::Result<BenchmarkResult> {
        let path = self
            .scratch_dir
            .join(format!(".syntropy-bench-{}", uuid::Uuid::new_v4()));
        let started = Instant::now();
        let result = (|| {
            let payload = vec![0xA5u8; DISK_BYTES];
            let mut file = fs::File::create(&path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
            drop(file);

            let mut back = Vec::with_capacity(DISK_BYTES);
            fs::File::open(&path)?.read_to_end(&mut back)?;
            if back.len() != DISK_BYTES {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"));
            }
            Ok(())
        })();
        let _ = fs::remove_file(&path);
        result.map(|()| measured("disk", started, self.weights.disk))
    }

    fn network(&self, ctx: &ProbeContext) -> BenchmarkResult {
        let Some(target) = self.network_target.as_deref() else {
            let started = Instant::now();
            thread::sleep(SIMULATED_RTT);
            let mut result = measured("network", started, self.weights.network);
            result.simulated = Some(true);
            return result;
        };

        let timeout = ctx.remaining(NETWORK_TIMEOUT);
        let started = Instant::now();
        let reachable = target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
            .unwrap_or(false);

        let mut result = measured("network", started, self.weights.network);
        if !reachable {
            debug!("Network benchmark target {} unreachable", target);
            result.score = 0.0;
        }
        result.simulated = Some(false);
        result
    }

    fn concurrency(&self) -> BenchmarkResult {
        let started = Instant::now();
        let handles: Vec<_> = (0..CONCURRENT_TASKS)
            .map(|t| thread::spawn(move || (0..10_000u64).map(|i| i * t as u64).sum::<u64>()))
            .collect();
        let total: u64 = handles.into_iter().filter_map(|h| h.join().ok()).sum();
        black_box(total);
        measured("concurrency", started, 1.0)
    }

    fn data_processing(&self) -> BenchmarkResult {
        let started = Instant::now();
        let mut data: Vec<i64> = (0..DATA_POINTS as i64).map(|i| (i * 7919) % 100_003).collect();
        data.sort_unstable();
        let even_sum: i64 = data.iter().filter(|v| *v % 2 == 0).sum();
        black_box(even_sum);
        measured("data_processing", started, 1.0)
    }

    fn encryption(&self) -> BenchmarkResult {
        let started = Instant::now();
        let block = vec![0x5Au8; BLOCK_SIZE];
        let mut hasher = Sha256::new();
        for _ in 0..4 {
            hasher.update(&block);
        }
        black_box(hasher.finalize());
        measured("encryption", started, 1.0)
    }
}

fn measured(name: &str, started: Instant, weight: f64) -> BenchmarkResult {
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    BenchmarkResult {
        name: name.to_string(),
        duration_ms,
        score: score(duration_ms, weight),
        simulated: None,
    }
}

fn component_findings(section: &PerformanceSection, fragment: &mut ValidationFragment) {
    let components = [
        ("CPU", section.cpu_score),
        ("MEMORY", section.memory_score),
        ("DISK", section.disk_score),
        ("NETWORK", section.network_score),
    ];
    for (name, value) in components {
        if value < LOW_SCORE {
            fragment.push(
                ValidationItem::warning(
                    format!("LOW_{}_PERFORMANCE", name),
                    format!("{} benchmark scored {:.1}/100", name.to_lowercase(), value),
                    Category::Performance,
                )
                .with_expected(format!(">= {:.0}", LOW_SCORE))
                .with_actual(format!("{:.1}", value)),
            );
        }
    }
}

impl Probe for PerformanceProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Performance
    }

    fn run(&self, req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
        let mut fragment = ValidationFragment::new(ProbeKind::Performance);
        let env = ResolvedEnvironment::resolve(&req.environment, &self.host.snapshot());
        let mut section = PerformanceSection::default();

        let cpu = self.cpu();
        let memory = self.memory();
        section.cpu_score = cpu.score;
        section.memory_score = memory.score;
        section.benchmarks.extend([cpu, memory]);

        if ctx.is_cancelled() {
            fragment.interrupted = true;
            fragment.performance = Some(section);
            return Ok(fragment);
        }

        let disk = match self.disk() {
            Ok(disk) => disk,
            Err(e) => {
                warn!("Disk benchmark in {} failed: {}", self.scratch_dir.display(), e);
                fragment.push(
                    ValidationItem::warning(
                        "DISK_BENCHMARK_FAILED",
                        format!(
                            "Disk benchmark could not write to {}: {}",
                            self.scratch_dir.display(),
                            e
                        ),
                        Category::Storage,
                    )
                    .with_actual(self.scratch_dir.display()),
                );
                BenchmarkResult {
                    name: "disk".to_string(),
                    duration_ms: 0.0,
                    score: 0.0,
                    simulated: None,
                }
            }
        };
        section.disk_score = disk.score;
        let network = self.network(ctx);
        section.network_score = network.score;
        section.benchmarks.extend([disk, network]);

        if ctx.is_cancelled() {
            fragment.interrupted = true;
        } else if !req.options.skip_optional {
            section
                .benchmarks
                .extend([self.concurrency(), self.data_processing(), self.encryption()]);
        }

        section.overall_score = overall_score(
            section.cpu_score,
            section.memory_score,
            section.disk_score,
            section.network_score,
        );
        debug!(
            "Performance scores: cpu={:.1} mem={:.1} disk={:.1} net={:.1} overall={:.1}",
            section.cpu_score, section.memory_score, section.disk_score, section.network_score, section.overall_score
        );

        component_findings(&section, &mut fragment);
        section.optimizations = optimizations(&section);

        if env.cpu_cores < MIN_CPU_CORES {
            fragment.push(
                ValidationItem::warning(
                    "INSUFFICIENT_CPU_CORES",
                    format!("Only {} CPU core(s) available, {} recommended", env.cpu_cores, MIN_CPU_CORES),
                    Category::Performance,
                )
                .with_field("cpu_cores")
                .with_expected(format!(">= {}", MIN_CPU_CORES))
                .with_actual(env.cpu_cores),
            );
        }
        if env.total_memory_gb < MIN_TOTAL_MEMORY_GB {
            fragment.push(
                ValidationItem::warning(
                    "INSUFFICIENT_MEMORY",
                    format!("{:.1} GB of memory installed, {:.0} GB recommended", env.total_memory_gb, MIN_TOTAL_MEMORY_GB),
                    Category::Performance,
                )
                .with_field("total_memory_gb")
                .with_expected(format!(">= {:.0}", MIN_TOTAL_MEMORY_GB))
                .with_actual(format!("{:.1}", env.total_memory_gb)),
            );
        }
        if env.available_memory_gb < MIN_AVAILABLE_MEMORY_GB {
            fragment.push(
                ValidationItem::warning(
                    "LOW_AVAILABLE_MEMORY",
                    format!("Only {:.2} GB of memory available", env.available_memory_gb),
                    Category::Performance,
                )
                .with_field("available_memory_gb")
                .with_expected(format!(">= {:.0}", MIN_AVAILABLE_MEMORY_GB))
                .with_actual(format!("{:.2}", env.available_memory_gb)),
            );
        }

        fragment.performance = Some(section);
        Ok(fragment)
    }
}

/// Suggestions for every component scoring under 70
pub fn optimizations(section: &PerformanceSection) -> Vec<String> {
    let mut out = Vec::new();
    if section.cpu_score < OPTIMIZE_SCORE {
        out.push("Close CPU-heavy applications or move the node to a faster machine".to_string());
    }
    if section.memory_score < OPTIMIZE_SCORE {
        out.push("Free memory by closing unused applications".to_string());
    }
    if section.disk_score < OPTIMIZE_SCORE {
        out.push("Place the .syntropy directory on a faster disk (SSD)".to_string());
    }
    if section.network_score < OPTIMIZE_SCORE {
        out.push("Use a wired connection or a closer network endpoint".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;
    use syntropy_common::InterfaceType;

    #[test]
    fn test_score_formula() {
        assert_eq!(score(0.0, 10.0), 100.0);
        assert_eq!(score(500.0, 10.0), 50.0);
        assert_eq!(score(5000.0, 10.0), 0.0);
        assert_eq!(score(40.0, 2.0), 80.0);
        assert_eq!(score(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_overall_weights() {
        assert!((overall_score(100.0, 100.0, 100.0, 100.0) - 100.0).abs() < 1e-9);
        assert!((overall_score(100.0, 0.0, 0.0, 0.0) - 30.0).abs() < 1e-9);
        assert!((overall_score(0.0, 0.0, 0.0, 100.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_optimizations_below_seventy() {
        let section = PerformanceSection {
            cpu_score: 69.0,
            memory_score: 90.0,
            disk_score: 10.0,
            network_score: 70.0,
            ..Default::default()
        };
        let tips = optimizations(&section);
        assert_eq!(tips.len(), 2);
        assert!(tips[1].contains("SSD"));
    }

    #[test]
    fn test_low_component_warnings() {
        let section = PerformanceSection {
            cpu_score: 10.0,
            memory_score: 90.0,
            disk_score: 49.9,
            network_score: 50.0,
            ..Default::default()
        };
        let mut fragment = ValidationFragment::new(ProbeKind::Performance);
        component_findings(&section, &mut fragment);
        let codes: Vec<_> = fragment.items.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["LOW_CPU_PERFORMANCE", "LOW_DISK_PERFORMANCE"]);
    }

    #[test]
    fn test_probe_reports_resource_shortfalls() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = StaticHost::healthy(dir.path());
        host.snapshot.cpu_cores = 1;
        host.snapshot.total_memory_gb = 2.0;
        host.snapshot.available_memory_gb = 0.5;
        let probe = PerformanceProbe::new(Arc::new(host)).with_scratch_dir(dir.path());
        let fragment = probe
            .run(&ValidationRequest::new(InterfaceType::Cli), &ProbeContext::new(Duration::from_secs(60)))
            .unwrap();

        assert!(fragment.has_code("INSUFFICIENT_CPU_CORES"));
        assert!(fragment.has_code("INSUFFICIENT_MEMORY"));
        assert!(fragment.has_code("LOW_AVAILABLE_MEMORY"));

        let section = fragment.performance.unwrap();
        let names: Vec<_> = section.benchmarks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cpu", "memory", "disk", "network", "concurrency", "data_processing", "encryption"]
        );
        assert!(section.benchmarks.iter().all(|b| (0.0..=100.0).contains(&b.score)));
        assert_eq!(section.benchmarks[3].simulated, Some(true));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_scratch_dir_is_a_finding() {
        let dir = tempfile::tempdir().unwrap();
        let probe = PerformanceProbe::new(Arc::new(StaticHost::healthy(dir.path())))
            .with_scratch_dir("/nonexistent/scratch");
        let fragment = probe
            .run(&ValidationRequest::new(InterfaceType::Cli), &ProbeContext::new(Duration::from_secs(60)))
            .unwrap();

        let item = fragment
            .items
            .iter()
            .find(|i| i.code == "DISK_BENCHMARK_FAILED")
            .unwrap();
        assert_eq!(item.category, Category::Storage);
        assert!(!item.severity.is_blocking());

        let section = fragment.performance.unwrap();
        assert_eq!(section.disk_score, 0.0);
        assert!(section.benchmarks.iter().any(|b| b.name == "disk" && b.score == 0.0));
    }
}
