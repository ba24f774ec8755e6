use crate::bucket::{BucketKey, Bucketer};
use crate::index::{DesignToken, InferredComponent, ScanIndex};
use crate::signature::StructuralSignature;
use frameticket_common::ScanConfig;
use frameticket_core::{DocumentSnapshot, StyleCategory, StyleValue};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Infers a design system (tokens and components) from a document snapshot
pub struct DesignSystemScanner {
    config: ScanConfig,
}

impl DesignSystemScanner {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Walk the tree once in document order and build the index.
    pub fn scan(&self, snapshot: &DocumentSnapshot) -> ScanIndex {
        let start = Instant::now();
        let node_count = snapshot.node_count();

        if node_count <= 1 {
            warn!(
                "Snapshot {} has {} node(s); returning an empty scan index",
                snapshot.id(),
                node_count
            );
            return ScanIndex::empty(snapshot.id().clone(), node_count, self.config.clone());
        }

        let mut bucketer = Bucketer::new(self.config.clone());
        let mut usage: HashMap<StyleCategory, CategoryUsage> = HashMap::new();
        let mut clusters = Clusters::default();

        for node in snapshot.root().iter() {
            let mut style = Vec::with_capacity(node.style.len());
            for (property, value) in &node.style {
                let (key, representative) = bucketer.learn(value);
                usage
                    .entry(value.category())
                    .or_default()
                    .record(&key, representative, &node.id);
                style.push((property.clone(), key));
            }

            if !node.children.is_empty() {
                let signature = StructuralSignature {
                    kind: node.kind,
                    child_kinds: node.child_kinds(),
                    style,
                };
                clusters.add(signature, &node.id, &node.name);
            }
        }

        let tokens = self.select_tokens(&mut usage);
        let components = self.select_components(clusters);

        info!(
            "Scanned {} nodes in {:.2}ms: {} tokens, {} components",
            node_count,
            start.elapsed().as_secs_f64() * 1000.0,
            tokens.len(),
            components.len()
        );

        ScanIndex::new(
            snapshot.id().clone(),
            node_count,
            tokens,
            components,
            self.config.clone(),
            bucketer.into_palette(),
        )
    }

    /// Top buckets per category by usage; ties keep document order.
    fn select_tokens(&self, usage: &mut HashMap<StyleCategory, CategoryUsage>) -> Vec<DesignToken> {
        let mut tokens = Vec::new();
        for category in StyleCategory::ALL {
            let Some(category_usage) = usage.remove(&category) else {
                continue;
            };
            let mut buckets: Vec<Bucket> = category_usage
                .buckets
                .into_iter()
                .filter(|b| b.usage_count >= self.config.min_token_usage)
                .collect();
            // Stable sort keeps first-seen order among equal counts.
            buckets.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));

            for (rank, bucket) in buckets
                .into_iter()
                .take(self.config.max_tokens_per_category)
                .enumerate()
            {
                debug!(
                    "Token {}-{} = {} ({} uses)",
                    category,
                    rank + 1,
                    bucket.value.describe(),
                    bucket.usage_count
                );
                tokens.push(DesignToken {
                    id: format!("{}-{}", category, rank + 1),
                    category,
                    key: bucket.key,
                    value: bucket.value,
                    usage_count: bucket.usage_count,
                    node_ids: bucket.node_ids,
                });
            }
        }
        tokens
    }

    fn select_components(&self, clusters: Clusters) -> Vec<InferredComponent> {
        clusters
            .entries
            .into_iter()
            .filter_map(|cluster| {
                let confidence = InferredComponent::confidence_for(cluster.member_ids.len());
                (confidence > self.config.min_component_confidence).then_some((cluster, confidence))
            })
            .enumerate()
            .map(|(i, (cluster, confidence))| InferredComponent {
                id: format!("component-{}", i + 1),
                name: cluster.name,
                signature: cluster.signature,
                member_ids: cluster.member_ids,
                confidence,
            })
            .collect()
    }
}

impl Default for DesignSystemScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan with an explicit configuration.
pub fn scan(snapshot: &DocumentSnapshot, config: &ScanConfig) -> ScanIndex {
    DesignSystemScanner::new()
        .with_config(config.clone())
        .scan(snapshot)
}

struct Bucket {
    key: BucketKey,
    value: StyleValue,
    usage_count: usize,
    node_ids: BTreeSet<String>,
}

/// Buckets of one category in first-seen order
#[derive(Default)]
struct CategoryUsage {
    buckets: Vec<Bucket>,
    positions: HashMap<BucketKey, usize>,
}

impl CategoryUsage {
    fn record(&mut self, key: &BucketKey, representative: StyleValue, node_id: &str) {
        let position = match self.positions.get(key) {
            Some(&p) => p,
            None => {
                self.buckets.push(Bucket {
                    key: key.clone(),
                    value: representative,
                    usage_count: 0,
                    node_ids: BTreeSet::new(),
                });
                self.positions.insert(key.clone(), self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        let bucket = &mut self.buckets[position];
        bucket.usage_count += 1;
        bucket.node_ids.insert(node_id.to_string());
    }
}

struct Cluster {
    signature: StructuralSignature,
    name: String,
    member_ids: Vec<String>,
}

#[derive(Default)]
struct Clusters {
    entries: Vec<Cluster>,
    positions: HashMap<StructuralSignature, usize>,
}

impl Clusters {
    fn add(&mut self, signature: StructuralSignature, node_id: &str, name: &str) {
        if let Some(&p) = self.positions.get(&signature) {
            self.entries[p].member_ids.push(node_id.to_string());
            return;
        }
        self.positions.insert(signature.clone(), self.entries.len());
        self.entries.push(Cluster {
            signature,
            name: name.to_string(),
            member_ids: vec![node_id.to_string()],
        });
    }
}
