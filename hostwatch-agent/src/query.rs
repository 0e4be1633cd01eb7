//! Keyword-driven answers to free-text questions about the host.
//!
//! A question is matched against an ordered rule table; the first rule with a
//! matching keyword renders the answer from the latest sample and a short window of
//! recent history. Questions nothing matches get a generic overview.

use hostwatch_core::Sample;
use hostwatch_persistent_storage::Store;
use tracing::debug;

/// Default number of recent samples consulted for historical ranges.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const MEMORY_WARNING: f64 = 80.0;
const DISK_CLEANUP: f64 = 75.0;
const CPU_HIGH_LOAD: f64 = 80.0;
const DISK_NEARLY_FULL: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCategory {
    Memory,
    Disk,
    Network,
    Cpu,
    Status,
}

/// Store contents an answer is rendered from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub latest: Sample,
    // Most recent first
    pub history: Vec<Sample>,
}

struct Rule {
    category: QueryCategory,
    keywords: &'static [&'static str],
    answer: fn(&Snapshot) -> String,
}

// Evaluated top to bottom; keywords overlap ("disk usage"), so order decides.
static RULES: &[Rule] = &[
    Rule {
        category: QueryCategory::Memory,
        keywords: &["memory", "ram", "usage"],
        answer: answer_memory,
    },
    Rule {
        category: QueryCategory::Disk,
        keywords: &["disk", "storage", "space"],
        answer: answer_disk,
    },
    Rule {
        category: QueryCategory::Network,
        keywords: &["network", "bandwidth", "upload"],
        answer: answer_network,
    },
    Rule {
        category: QueryCategory::Cpu,
        keywords: &["cpu", "processor", "utilization"],
        answer: answer_cpu,
    },
    Rule {
        category: QueryCategory::Status,
        keywords: &["status", "health", "overview"],
        answer: answer_status,
    },
];

// A keyword matches anywhere in the lower-cased question, inside words too
fn find_rule(question: &str) -> Option<&'static Rule> {
    let question = question.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| question.contains(kw)))
}

/// Category of `question`, or `None` when no keyword matches.
pub fn classify(question: &str) -> Option<QueryCategory> {
    find_rule(question).map(|rule| rule.category)
}

/// Render the answer for `question` from `snapshot`.
pub fn render(question: &str, snapshot: &Snapshot) -> String {
    match find_rule(question) {
        Some(rule) => (rule.answer)(snapshot),
        None => answer_fallback(snapshot),
    }
}

fn marker(value: f64, threshold: f64, label: &str) -> String {
    if value > threshold {
        format!(" ({})", label)
    } else {
        String::new()
    }
}

fn answer_memory(s: &Snapshot) -> String {
    let current = s.latest.memory;
    let (min, max) = if s.history.is_empty() {
        (current, current)
    } else {
        s.history.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h.memory), hi.max(h.memory))
        })
    };
    format!(
        "Current memory usage is {:.1}%{}. Historical range: {:.1}%-{:.1}%",
        current,
        marker(current, MEMORY_WARNING, "Warning!"),
        min,
        max
    )
}

fn answer_disk(s: &Snapshot) -> String {
    let disk = s.latest.disk;
    let advice = if disk > DISK_CLEANUP {
        "Consider cleaning up files."
    } else {
        "Space is available."
    };
    format!("Disk usage is at {:.1}%. {}", disk, advice)
}

fn answer_network(s: &Snapshot) -> String {
    format!("Network data sent: {} bytes", s.latest.network_bytes())
}

fn answer_cpu(s: &Snapshot) -> String {
    format!("CPU is at {:.1}% utilization", s.latest.cpu)
}

fn answer_status(s: &Snapshot) -> String {
    let l = &s.latest;
    format!(
        "System overview:\n- CPU: {:.1}%{}\n- Memory: {:.1}%{}\n- Disk: {:.1}%{}",
        l.cpu,
        marker(l.cpu, CPU_HIGH_LOAD, "High load!"),
        l.memory,
        marker(l.memory, MEMORY_WARNING, "Warning!"),
        l.disk,
        marker(l.disk, DISK_NEARLY_FULL, "Nearly full!"),
    )
}

fn answer_fallback(s: &Snapshot) -> String {
    let l = &s.latest;
    format!(
        "I can report that currently: CPU is at {:.1}%, Memory at {:.1}%, and Disk at {:.1}%.",
        l.cpu, l.memory, l.disk
    )
}

/// Answers questions from the store's current contents. Never fails.
#[derive(Debug, Clone)]
pub struct QueryResponder {
    store: Store,
    history_window: usize,
}

impl QueryResponder {
    pub fn new(store: Store, history_window: usize) -> Self {
        Self {
            store,
            history_window,
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            latest: self.store.latest().await,
            history: self.store.recent(self.history_window).await,
        }
    }

    pub async fn answer(&self, question: &str) -> String {
        let snapshot = self.snapshot().await;
        debug!(
            target = "query",
            category = ?classify(question),
            history = snapshot.history.len(),
            "answering question"
        );
        render(question, &snapshot)
    }
}
