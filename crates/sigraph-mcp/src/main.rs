use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use sigraph_cluster::{ClusterConfig, Clustering, Vectorizer};
use sigraph_core::{
    codec, guide::GUIDE, DecisionPath, DecisionTree, Forest, GraphDocument, SelectionConfig,
    Settings, Strategy,
};
use tracing_subscriber::EnvFilter;

mod init;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GraphNameRequest {
    /// Name of the stored graph
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EncodeRulesRequest {
    /// Every feature (column) name of the model the rules came from
    features: Vec<String>,
    /// Readable rules, e.g. "(age <= 50.00) AND (bmi > 25.50)"
    rules: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DecodeRulesRequest {
    /// The same feature names the rules were encoded with
    features: Vec<String>,
    /// Encoded rules, e.g. "FEAT_0_LTE_50.00 AND FEAT_1_GT_25.50"
    encoded_rules: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ExtractRulesRequest {
    /// Feature names in model column order (tree `feature` values index into this list)
    features: Vec<String>,
    /// Fitted trees in array form
    trees: Vec<DecisionTree>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct TraceSampleRequest {
    /// Feature names in model column order
    features: Vec<String>,
    /// Fitted trees in array form
    trees: Vec<DecisionTree>,
    /// One value per feature, in the same order as `features`
    sample: Vec<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct BuildGraphRequest {
    /// Name to store the graph under (letters, digits, '-', '_', '.')
    name: String,
    /// Every feature (column) name of the model
    features: Vec<String>,
    /// Readable rules
    #[serde(default)]
    rules: Vec<String>,
    /// Glob of text files with one readable rule per line (lines starting with '#' are ignored)
    rule_files: Option<String>,
    /// Abort on the first malformed rule instead of skipping it
    #[serde(default)]
    fail_fast: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SelectEdgesRequest {
    /// Name of the stored graph
    name: String,
    /// Maximum number of edges to keep (defaults to the maxEdges setting)
    max_edges: Option<usize>,
    /// "topK" or "integerProgram" (defaults to the strategy setting)
    strategy: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ClusterRulesRequest {
    /// Readable or encoded rules
    rules: Vec<String>,
    /// Number of clusters (defaults to the clusterCount setting)
    clusters: Option<usize>,
    /// "count" or "tfidf" (defaults to the vectorizer setting)
    vectorizer: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SetSettingsRequest {
    max_edges: Option<usize>,
    strategy: Option<String>,
    /// Largest integer program to attempt; 0 removes the limit
    max_solver_variables: Option<usize>,
    cluster_count: Option<usize>,
    vectorizer: Option<String>,
}

// --- Responses ---

#[derive(Debug, Serialize, PartialEq)]
struct RuleOutcome {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RuleOutcome {
    fn new(input: &str, result: Result<String, sigraph_core::CodecError>) -> Self {
        match result {
            Ok(output) => Self {
                input: input.to_string(),
                output: Some(output),
                error: None,
            },
            Err(e) => Self {
                input: input.to_string(),
                output: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracedPath {
    tree: usize,
    rule: String,
    #[serde(flatten)]
    path: DecisionPath,
}

const PREVIEW_PER_GROUP: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterReport {
    clusters: usize,
    labels: Vec<usize>,
    groups: Vec<Vec<String>>,
    /// First rules of each group, for a quick read.
    preview: Vec<Vec<String>>,
}

// --- Server ---

#[derive(Clone)]
pub struct SigraphServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SigraphServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all stored rule graphs")]
    fn list_graphs(&self) -> Result<CallToolResult, McpError> {
        match sigraph_core::list_graphs() {
            Ok(names) => {
                let text = if names.is_empty() {
                    "No graphs found. Use build_graph to create one.".to_string()
                } else {
                    names.join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(
        description = "Get a stored graph document: {features, encodedRules, skipped?, graph: {nodes, edges: [{from, to, weight}]}}. An edge A -> B with weight n means B was tested directly after A in n rule paths."
    )]
    fn get_graph(
        &self,
        Parameters(req): Parameters<GraphNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match sigraph_core::read_graph(&req.name) {
            Ok(doc) => Ok(json(&doc)),
            Err(e) => Ok(fail(format!("Failed to read graph '{}': {}", req.name, e))),
        }
    }

    #[tool(description = "Delete a stored graph")]
    fn delete_graph(
        &self,
        Parameters(req): Parameters<GraphNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match sigraph_core::delete_graph(&req.name) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Deleted graph '{}'",
                req.name
            ))])),
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(
        description = "Encode readable rules into FEAT_<index>_<LTE|GT>_<threshold> tokens. Returns one {input, output?, error?} entry per rule. Feature names are sorted before indexing, so encoded rules only decode against the same feature list."
    )]
    fn encode_rules(
        &self,
        Parameters(req): Parameters<EncodeRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let index = sigraph_core::FeatureIndex::fit(req.features);
        Ok(json(&outcomes(&req.rules, codec::encode(&req.rules, &index))))
    }

    #[tool(
        description = "Decode FEAT_ tokens back into readable rules. Returns one {input, output?, error?} entry per rule. Thresholds come back with two decimals."
    )]
    fn decode_rules(
        &self,
        Parameters(req): Parameters<DecodeRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let index = sigraph_core::FeatureIndex::fit(req.features);
        Ok(json(&outcomes(
            &req.encoded_rules,
            codec::decode(&req.encoded_rules, &index),
        )))
    }

    #[tool(
        description = "Extract every root-to-leaf decision path of the given trees as readable rules. Trees use the fitted array form {childrenLeft, childrenRight, feature, threshold, value?}; a left child of -1 marks a leaf. Feed the result to build_graph."
    )]
    fn extract_rules(
        &self,
        Parameters(req): Parameters<ExtractRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let forest = Forest { trees: req.trees };
        match forest.rule_paths(&req.features) {
            Ok(rules) => Ok(json(&rules)),
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(
        description = "Follow one sample through every tree. Returns per tree {tree, rule, steps: [{feature, threshold, direction}], leaf, prediction}; `rule` is the path in extract_rules form."
    )]
    fn trace_sample(
        &self,
        Parameters(req): Parameters<TraceSampleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let forest = Forest { trees: req.trees };
        match traced_paths(&forest, &req.sample, &req.features) {
            Ok(paths) => Ok(json(&paths)),
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(
        description = "Compile rules into a feature transition graph and store it under `name`. Rules come from `rules`, from files matching `ruleFiles`, or both. Malformed rules are skipped and listed unless failFast is set; an unknown feature aborts the build."
    )]
    fn build_graph(
        &self,
        Parameters(req): Parameters<BuildGraphRequest>,
    ) -> Result<CallToolResult, McpError> {
        let doc = match compile(&req) {
            Ok(doc) => doc,
            Err(e) => return Ok(fail(e)),
        };
        match sigraph_core::write_graph(&req.name, &doc) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(summarize(
                &req.name, &doc,
            ))])),
            Err(e) => Ok(fail(format!("Failed to store graph '{}': {}", req.name, e))),
        }
    }

    #[tool(
        description = "Maximum-weight spanning arborescence of a stored graph: every feature keeps at most one incoming edge. Returns {kind: arborescence, root, tree} or {kind: branching, roots, forest} when no feature reaches all others, or {kind: noTransitions}."
    )]
    fn simplify_graph(
        &self,
        Parameters(req): Parameters<GraphNameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match sigraph_core::read_graph(&req.name) {
            Ok(doc) => Ok(json(&sigraph_core::simplify(&doc.graph))),
            Err(e) => Ok(fail(format!("Failed to read graph '{}': {}", req.name, e))),
        }
    }

    #[tool(
        description = "Keep at most maxEdges edges of a stored graph with the largest total weight. Returns {status, edges, totalWeight, maxEdges}. Only status `optimal` carries edges; any other status is reported as an error."
    )]
    fn select_edges(
        &self,
        Parameters(req): Parameters<SelectEdgesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let config = match selection_config(
            &sigraph_core::read_settings(),
            req.max_edges,
            req.strategy.as_deref(),
        ) {
            Ok(c) => c,
            Err(e) => return Ok(fail(e)),
        };
        let doc = match sigraph_core::read_graph(&req.name) {
            Ok(doc) => doc,
            Err(e) => return Ok(fail(format!("Failed to read graph '{}': {}", req.name, e))),
        };

        let result = sigraph_core::select(&doc.graph, &config);
        if result.is_optimal() {
            Ok(json(&result))
        } else {
            Ok(fail(format!(
                "Selection finished with status {:?}; no edges returned. Try strategy \"topK\" or raise maxSolverVariables.",
                result.status
            )))
        }
    }

    #[tool(
        description = "Group rules by text similarity (average-linkage clustering on cosine distance). Returns {clusters, labels, groups, preview}; preview holds the first 5 rules of each group. Works on readable or encoded rules."
    )]
    fn cluster_rules(
        &self,
        Parameters(req): Parameters<ClusterRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let config = match cluster_config(
            &sigraph_core::read_settings(),
            req.clusters,
            req.vectorizer.as_deref(),
        ) {
            Ok(c) => c,
            Err(e) => return Ok(fail(e)),
        };
        match sigraph_cluster::cluster_rules(&req.rules, &config) {
            Ok(c) => Ok(json(&cluster_report(c))),
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(description = "Get the current settings (defaults for select_edges and cluster_rules)")]
    fn get_settings(&self) -> Result<CallToolResult, McpError> {
        Ok(json(&sigraph_core::read_settings()))
    }

    #[tool(description = "Update settings. Only the given fields change.")]
    fn set_settings(
        &self,
        Parameters(req): Parameters<SetSettingsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = match apply_settings(sigraph_core::read_settings(), req) {
            Ok(s) => s,
            Err(e) => return Ok(fail(e)),
        };
        match sigraph_core::write_settings(&settings) {
            Ok(()) => Ok(json(&settings)),
            Err(e) => Ok(fail(e)),
        }
    }

    #[tool(description = "Get the rule grammar and the recommended workflow")]
    fn get_guide(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(GUIDE)]))
    }
}

#[tool_handler]
impl ServerHandler for SigraphServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## Rules\n{}", INSTRUCTIONS, GUIDE);
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn json<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => fail(format!("Serialization error: {}", e)),
    }
}

fn fail(msg: impl ToString) -> CallToolResult {
    CallToolResult::error(vec![Content::text(msg.to_string())])
}

fn outcomes(
    inputs: &[String],
    results: Vec<Result<String, sigraph_core::CodecError>>,
) -> Vec<RuleOutcome> {
    inputs
        .iter()
        .zip(results)
        .map(|(input, result)| RuleOutcome::new(input, result))
        .collect()
}

fn traced_paths(
    forest: &Forest,
    sample: &[f64],
    features: &[String],
) -> sigraph_core::Result<Vec<TracedPath>> {
    Ok(forest
        .trace(sample, features)?
        .into_iter()
        .enumerate()
        .map(|(tree, path)| TracedPath {
            tree,
            rule: path.to_rule(),
            path,
        })
        .collect())
}

fn cluster_report(c: Clustering) -> ClusterReport {
    let preview = c
        .preview(PREVIEW_PER_GROUP)
        .into_iter()
        .map(|g| g.into_iter().map(String::from).collect())
        .collect();
    ClusterReport {
        clusters: c.len(),
        preview,
        labels: c.labels,
        groups: c.groups,
    }
}

fn compile(req: &BuildGraphRequest) -> Result<GraphDocument, String> {
    let mut rules = req.rules.clone();
    if let Some(pattern) = &req.rule_files {
        let from_files = sigraph_core::read_rule_files(pattern).map_err(|e| e.to_string())?;
        if from_files.is_empty() {
            return Err(format!("No rules found in files matching '{}'", pattern));
        }
        rules.extend(from_files);
    }
    if rules.is_empty() {
        return Err("No rules given. Pass `rules` or `ruleFiles`.".to_string());
    }
    if req.features.is_empty() {
        return Err("No feature names given.".to_string());
    }
    GraphDocument::compile(&rules, &req.features, req.fail_fast).map_err(|e| e.to_string())
}

fn summarize(name: &str, doc: &GraphDocument) -> String {
    let mut out = if doc.graph.is_empty() {
        format!(
            "Stored graph '{}': {} (no rule has two or more conditions).",
            name,
            sigraph_core::arborescence::NO_TRANSITIONS
        )
    } else {
        format!(
            "Stored graph '{}': {} nodes, {} edges, {} transitions from {} rules.",
            name,
            doc.graph.node_count(),
            doc.graph.edge_count(),
            doc.graph.total_weight(),
            doc.encoded_rules.len()
        )
    };
    if !doc.skipped.is_empty() {
        out.push_str(&format!("\nSkipped {} rule(s):", doc.skipped.len()));
        for s in &doc.skipped {
            out.push_str(&format!("\n  - {}", s.reason));
        }
    }
    out
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    Strategy::parse(s)
        .ok_or_else(|| format!("Unknown strategy '{}'. Use \"topK\" or \"integerProgram\".", s))
}

fn selection_config(
    settings: &Settings,
    max_edges: Option<usize>,
    strategy: Option<&str>,
) -> Result<SelectionConfig, String> {
    let mut config = settings.selection();
    if let Some(k) = max_edges {
        config.max_edges = k;
    }
    if let Some(s) = strategy {
        config.strategy = parse_strategy(s)?;
    }
    Ok(config)
}

fn cluster_config(
    settings: &Settings,
    clusters: Option<usize>,
    vectorizer: Option<&str>,
) -> Result<ClusterConfig, String> {
    let vectorizer: Vectorizer = vectorizer
        .unwrap_or(settings.vectorizer.as_str())
        .parse()
        .map_err(|e: sigraph_cluster::ClusterError| e.to_string())?;
    Ok(ClusterConfig {
        n_clusters: clusters.unwrap_or(settings.cluster_count),
        vectorizer,
    })
}

fn apply_settings(mut settings: Settings, req: SetSettingsRequest) -> Result<Settings, String> {
    if let Some(k) = req.max_edges {
        settings.max_edges = k;
    }
    if let Some(s) = req.strategy {
        settings.strategy = parse_strategy(&s)?;
    }
    if let Some(v) = req.max_solver_variables {
        settings.max_solver_variables = (v > 0).then_some(v);
    }
    if let Some(c) = req.cluster_count {
        if c == 0 {
            return Err("clusterCount must be at least 1".to_string());
        }
        settings.cluster_count = c;
    }
    if let Some(v) = req.vectorizer {
        v.parse::<Vectorizer>().map_err(|e| e.to_string())?;
        settings.vectorizer = v.to_ascii_lowercase();
    }
    Ok(settings)
}

const INSTRUCTIONS: &str = r#"sigraph compiles the decision rules of a tree ensemble into a small weighted graph of feature transitions (a surrogate interpretable graph). Graphs are stored as .sig documents (JSON) in ~/.sigraph/ (or $SIGRAPH_HOME).

Typical session: extract_rules (or bring your own rule strings) -> build_graph -> select_edges. Use simplify_graph for a quick one-parent-per-feature view and cluster_rules to group similar rules before reading them. trace_sample shows which rule a single sample follows. Call get_guide for the rule grammar."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("init") {
        let options = init::parse_args(args)?;
        return init::run(options);
    }

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let service = SigraphServer::new()
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
