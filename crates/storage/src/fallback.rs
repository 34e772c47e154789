//! Built-in question bank used when the bundled database cannot be read.

use exam_core::model::{AnswerKind, Question, QuestionDraft, QuestionId};
use tracing::warn;

use crate::repository::InMemoryRepository;

/// Domain labels covered by the built-in bank, in display order.
pub const BUILTIN_DOMAINS: [&str; 6] = [
    "Kubernetes_Security_Fundamentals",
    "Kubernetes_Cluster_Component_Security",
    "Kubernetes_Threat_Model",
    "Cloud_Native_Security",
    "Platform_Security",
    "Compliance_and_Security_Frameworks",
];

struct Entry {
    id: u64,
    domain: usize,
    prompt: &'static str,
    options: &'static [&'static str],
    kind: AnswerKind,
    correct: &'static [usize],
    source: &'static str,
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: 1,
        domain: 0,
        prompt: "Which Kubernetes object grants a set of permissions within a single namespace?",
        options: &["ClusterRole", "Role", "ServiceAccount", "NetworkPolicy"],
        kind: AnswerKind::Single,
        correct: &[1],
        source: "https://kubernetes.io/docs/reference/access-authn-authz/rbac/",
    },
    Entry {
        id: 2,
        domain: 0,
        prompt: "Which Pod Security Standards profiles are defined by Kubernetes?",
        options: &["Privileged", "Baseline", "Hardened", "Restricted"],
        kind: AnswerKind::Multiple,
        correct: &[0, 1, 3],
        source: "https://kubernetes.io/docs/concepts/security/pod-security-standards/",
    },
    Entry {
        id: 3,
        domain: 1,
        prompt: "Which component stores all cluster state and should be encrypted at rest?",
        options: &["kube-scheduler", "kubelet", "etcd", "kube-proxy"],
        kind: AnswerKind::Single,
        correct: &[2],
        source: "https://kubernetes.io/docs/tasks/administer-cluster/encrypt-data/",
    },
    Entry {
        id: 4,
        domain: 1,
        prompt: "Which kubelet settings reduce its attack surface?",
        options: &[
            "Disable anonymous authentication",
            "Use Webhook authorization mode",
            "Expose the read-only port 10255",
            "Run with --allow-privileged on every node",
        ],
        kind: AnswerKind::Multiple,
        correct: &[0, 1],
        source: "https://kubernetes.io/docs/reference/access-authn-authz/kubelet-authn-authz/",
    },
    Entry {
        id: 5,
        domain: 2,
        prompt: "An attacker with create-pod rights mounts the host filesystem. Which STRIDE category best fits?",
        options: &["Spoofing", "Elevation of privilege", "Repudiation", "Denial of service"],
        kind: AnswerKind::Single,
        correct: &[1],
        source: "https://github.com/cncf/financial-user-group/tree/main/projects/k8s-threat-model",
    },
    Entry {
        id: 6,
        domain: 2,
        prompt: "Which controls limit lateral movement between workloads after a container compromise?",
        options: &[
            "NetworkPolicies with default deny",
            "Dedicated ServiceAccounts without automounted tokens",
            "Larger node pools",
            "Running all workloads in the default namespace",
        ],
        kind: AnswerKind::Multiple,
        correct: &[0, 1],
        source: "https://kubernetes.io/docs/concepts/services-networking/network-policies/",
    },
    Entry {
        id: 7,
        domain: 3,
        prompt: "What are the 4C's of cloud native security, from the outermost layer inward?",
        options: &[
            "Cloud, Cluster, Container, Code",
            "Code, Container, Cluster, Cloud",
            "Cluster, Cloud, Code, Container",
            "Container, Code, Cloud, Cluster",
        ],
        kind: AnswerKind::Single,
        correct: &[0],
        source: "https://kubernetes.io/docs/concepts/security/overview/",
    },
    Entry {
        id: 8,
        domain: 3,
        prompt: "Which practices strengthen the container image supply chain?",
        options: &[
            "Signing images and verifying signatures at admission",
            "Scanning images for known vulnerabilities",
            "Always pulling the latest tag",
            "Generating an SBOM for each build",
        ],
        kind: AnswerKind::Multiple,
        correct: &[0, 1, 3],
        source: "https://github.com/cncf/tag-security/tree/main/community/working-groups/supply-chain-security",
    },
    Entry {
        id: 9,
        domain: 4,
        prompt: "Which admission mechanism lets you reject Pods that do not meet custom policy?",
        options: &[
            "ValidatingAdmissionWebhook",
            "HorizontalPodAutoscaler",
            "PodDisruptionBudget",
            "EndpointSlice",
        ],
        kind: AnswerKind::Single,
        correct: &[0],
        source: "https://kubernetes.io/docs/reference/access-authn-authz/extensible-admission-controllers/",
    },
    Entry {
        id: 10,
        domain: 4,
        prompt: "What does a service mesh typically add for workload-to-workload traffic?",
        options: &[
            "Mutual TLS between services",
            "Automatic etcd backups",
            "Identity-based authorization policies",
            "Node kernel patching",
        ],
        kind: AnswerKind::Multiple,
        correct: &[0, 2],
        source: "https://istio.io/latest/docs/concepts/security/",
    },
    Entry {
        id: 11,
        domain: 5,
        prompt: "Which benchmark provides prescriptive configuration checks for Kubernetes components?",
        options: &["CIS Kubernetes Benchmark", "OWASP Top 10", "PCI DSS", "ISO 9001"],
        kind: AnswerKind::Single,
        correct: &[0],
        source: "https://www.cisecurity.org/benchmark/kubernetes",
    },
    Entry {
        id: 12,
        domain: 5,
        prompt: "Which tool runs the CIS Kubernetes Benchmark checks against a cluster?",
        options: &["kube-bench", "kubeadm", "kubectl top", "kustomize"],
        kind: AnswerKind::Single,
        correct: &[0],
        source: "https://github.com/aquasecurity/kube-bench",
    },
];

/// The built-in question list. Entries that fail validation are skipped.
#[must_use]
pub fn builtin_questions() -> Vec<Question> {
    ENTRIES
        .iter()
        .filter_map(|entry| {
            let draft = QuestionDraft {
                id: QuestionId::new(entry.id),
                domain: BUILTIN_DOMAINS[entry.domain].to_string(),
                prompt: entry.prompt.to_string(),
                options: entry.options.iter().map(ToString::to_string).collect(),
                kind: entry.kind,
                correct: entry.correct.to_vec(),
                sources: vec![entry.source.to_string()],
            };
            match draft.validate() {
                Ok(question) => Some(question),
                Err(err) => {
                    warn!(id = entry.id, %err, "skipping invalid built-in question");
                    None
                }
            }
        })
        .collect()
}

/// An in-memory bank holding the built-in questions.
#[must_use]
pub fn builtin_bank() -> InMemoryRepository {
    InMemoryRepository::with_questions(builtin_questions())
}
