/// Rule grammar and workflow, served as server instructions and by `get_guide`.
pub const GUIDE: &str = "\
1. Rules are decision paths. Each rule is one root-to-leaf path of a tree, written as conditions \
joined by \" AND \": `(mean radius <= 15.05) AND (worst area > 880.80)`. Only `<=` and `>` are \
valid comparisons. Condition order is traversal order and matters.\n\
2. Feature names define the index. Pass the full list of feature (column) names. Names are sorted \
before indices are assigned, so the same name set always gives the same encoding. Encoded rules are \
only valid against the feature list they were encoded with.\n\
3. Encoded tokens look like `FEAT_<index>_<LTE|GT>_<threshold>`. Thresholds keep two decimals; \
decoding is exact for names and operators but not for thresholds beyond two decimals.\n\
4. Edges count adjacency, not causality. An edge A -> B with weight n means B was tested directly \
after A in n rule paths. A feature tested twice in a row yields a self-edge. Features never adjacent \
to another feature do not appear in the graph.\n\
5. An empty graph is a result, not a failure. If no rule has two or more conditions there are no \
transitions to show.\n\
6. Two simplified views exist. `simplify_graph` keeps one heaviest incoming edge per feature \
(a maximum spanning arborescence) and is a quick diagnostic. `select_edges` keeps the heaviest \
`maxEdges` edges overall and is the bounded graph meant for publication. Neither view is \
guaranteed acyclic or connected.\n\
7. Check the selection status. Only a selection with status `optimal` carries edges. Any other \
status means the result must not be used as a graph.\n\
\n\
## Workflow\n\
1. Produce rules: either pass rule strings directly, point `ruleFiles` at text files with one rule \
per line, or call `extract_rules` with fitted trees in array form \
(childrenLeft, childrenRight, feature, threshold).\n\
2. `build_graph` with a name, the feature list and the rules. Malformed rules are skipped and \
reported unless `failFast` is set; an unknown feature always aborts the build.\n\
3. `simplify_graph` or `select_edges` on the stored graph. Defaults come from `get_settings`.\n\
4. Optionally `cluster_rules` to group similar rules before reading them.";
