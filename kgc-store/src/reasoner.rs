//! `Reasoner` port: monotonic N3 forward chaining behind a process boundary
//!
//! The engine never interprets rules itself; it hands (state, rules) to a
//! reasoner and loads the returned closure back into the store. The port
//! must not mutate its inputs, and unavailability is fatal for the tick
//! that needed it.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

/// Output of one reasoner invocation
#[derive(Debug, Clone)]
pub struct ReasonerOutput {
    /// Deductive closure: all input triples plus everything inferred, as Turtle
    pub graph: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: f64,
}

/// Deductive closure producer over (state graph, rules graph)
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Compute the closure of `state_turtle` under `rules`; inputs are never
    /// mutated. A failed run returns `success = false` with an error string.
    async fn reason(&self, state_turtle: &str, rules: &str) -> StoreResult<ReasonerOutput>;

    /// Probe the external dependency. Callers must treat `false` as fatal
    /// for tick execution, never as a silent degrade.
    fn is_available(&self) -> bool;
}

/// EYE N3 reasoner invoked as a subprocess
///
/// Runs `eye --quiet --nope --pass-all <state> <rules>` over temp files and
/// captures the closure from stdout.
pub struct EyeReasoner {
    binary: PathBuf,
}

impl EyeReasoner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The conventional `eye` on PATH
    pub fn default_binary() -> Self {
        Self::new("eye")
    }

    fn write_temp(content: &str, suffix: &str) -> StoreResult<NamedTempFile> {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl Reasoner for EyeReasoner {
    async fn reason(&self, state_turtle: &str, rules: &str) -> StoreResult<ReasonerOutput> {
        if !self.is_available() {
            return Err(StoreError::ReasonerUnavailable(format!(
                "reasoner binary {} not found",
                self.binary.display()
            )));
        }

        let state_file = Self::write_temp(state_turtle, ".ttl")?;
        let rules_file = Self::write_temp(rules, ".n3")?;

        let started = Instant::now();
        let output = tokio::process::Command::new(&self.binary)
            .arg("--quiet")
            .arg("--nope")
            .arg("--pass-all")
            .arg(state_file.path())
            .arg(rules_file.path())
            .output()
            .await
            .map_err(|e| StoreError::Reasoner(format!("failed to spawn reasoner: {}", e)))?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if output.status.success() {
            let graph = String::from_utf8(output.stdout)
                .map_err(|e| StoreError::Reasoner(format!("closure is not UTF-8: {}", e)))?;
            Ok(ReasonerOutput {
                graph,
                success: true,
                error: None,
                duration_ms,
            })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(status = %output.status, "reasoner run failed");
            Ok(ReasonerOutput {
                graph: String::new(),
                success: false,
                error: Some(stderr),
                duration_ms,
            })
        }
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.binary)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Scripted reasoner for hermetic test suites
///
/// Applies a caller-supplied transform to the state graph. The default
/// passthrough returns the state unchanged, which makes every tick converge
/// immediately; tests exercising deduction provide their own transform.
#[derive(Clone)]
pub struct FixtureReasoner {
    transform: Arc<dyn Fn(&str, &str) -> String + Send + Sync>,
    available: bool,
}

impl FixtureReasoner {
    /// Closure produced by applying `transform(state, rules)`
    pub fn new(transform: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            transform: Arc::new(transform),
            available: true,
        }
    }

    /// Identity closure: output equals input state
    pub fn passthrough() -> Self {
        Self::new(|state, _| state.to_string())
    }

    /// A reasoner whose availability probe fails
    pub fn unavailable() -> Self {
        Self {
            transform: Arc::new(|state: &str, _: &str| state.to_string()),
            available: false,
        }
    }
}

#[async_trait]
impl Reasoner for FixtureReasoner {
    async fn reason(&self, state_turtle: &str, rules: &str) -> StoreResult<ReasonerOutput> {
        if !self.available {
            return Err(StoreError::ReasonerUnavailable(
                "fixture reasoner marked unavailable".to_string(),
            ));
        }
        let started = Instant::now();
        let graph = (self.transform)(state_turtle, rules);
        Ok(ReasonerOutput {
            graph,
            success: true,
            error: None,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }
}
