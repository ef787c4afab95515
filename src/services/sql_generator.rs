//! SQL Generator
//!
//! Pure function of `(intent, dialect, KG join info)` to dialect-correct SQL
//! text. Every identifier is quoted exactly once with the dialect's rule;
//! joins always come from real KG edge columns - a missing join condition
//! drops the projection or fails the query, never emits a placeholder.

use std::collections::{HashMap, HashSet};

use crate::models::{
    KnowledgeGraph, Operation, QueryIntent, QueryType, ReconQueryType, ReconciliationRule,
    table_node_id,
};
use crate::services::join_planner::join_condition;
use crate::utils::{EngineError, EngineResult, is_excluded};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgresql,
    SqlServer,
    Oracle,
}

impl Dialect {
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "oracle" => Ok(Self::Oracle),
            other => Err(EngineError::InvalidRequest(format!("Unknown SQL dialect: {}", other))),
        }
    }

    /// Quote one identifier (never a dotted path).
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgresql | Self::Oracle => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }
}

/// Escape a literal string value for a single-quoted SQL literal.
fn escape_value(value: &str) -> String {
    value.replace('\'', "''")
}

/// `<schema>.<table>` with both parts quoted, or just the quoted table.
fn qualify(dialect: Dialect, prefix: Option<&str>, table: &str) -> String {
    match prefix {
        Some(schema) if !schema.is_empty() => {
            format!("{}.{}", dialect.quote(schema), dialect.quote(table))
        },
        _ => dialect.quote(table),
    }
}

/// Join-table aliases derive from the table's last name token (`s`/`t` are
/// reserved for source and target).
fn join_alias(label: &str, taken: &mut HashSet<String>) -> String {
    let base = label
        .rsplit(['_', ' '])
        .next()
        .and_then(|tok| tok.chars().next())
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_else(|| "j".to_string());
    let mut alias = base.clone();
    let mut n = 2;
    while alias == "s" || alias == "t" || taken.contains(&alias) {
        alias = format!("{}{}", base, n);
        n += 1;
    }
    taken.insert(alias.clone());
    alias
}

/// Optional per-table schema prefixes (label, case-insensitive key).
pub type TablePrefixes = HashMap<String, String>;

fn prefix_for<'a>(prefixes: &'a TablePrefixes, table: &str) -> Option<&'a str> {
    prefixes.get(&table.to_lowercase()).map(|s| s.as_str())
}

/// Generate SQL for a parsed intent without schema prefixes.
pub fn generate(intent: &QueryIntent, dialect: Dialect, kg: &KnowledgeGraph) -> EngineResult<String> {
    generate_with_prefixes(intent, dialect, kg, &TablePrefixes::new())
}

/// Generate SQL for a parsed intent, qualifying tables with the given schema
/// prefixes (the executor's first attempt; the retry passes an empty map).
pub fn generate_with_prefixes(
    intent: &QueryIntent,
    dialect: Dialect,
    kg: &KnowledgeGraph,
    prefixes: &TablePrefixes,
) -> EngineResult<String> {
    match intent.query_type {
        QueryType::ComparisonQuery => comparison_sql(intent, dialect, kg, prefixes),
        QueryType::FilterQuery => filter_sql(intent, dialect, kg, prefixes),
        QueryType::AggregationQuery => aggregation_sql(intent, dialect, prefixes),
        QueryType::DataQuery | QueryType::Relationship => data_sql(intent, dialect, kg, prefixes),
    }
}

/// Source-side projection: explicit column list minus excluded fields when
/// the KG knows the columns, `s.*` otherwise (the executor then post-filters
/// result columns).
fn source_projection(intent: &QueryIntent, dialect: Dialect, kg: &KnowledgeGraph) -> String {
    let columns = kg
        .node(&table_node_id(&intent.source_table))
        .and_then(|n| n.properties.get("columns"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|c| !is_excluded(c))
                .map(|c| format!("s.{}", dialect.quote(c)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if columns.is_empty() { "s.*".to_string() } else { columns.join(", ") }
}

struct JoinPlan {
    clauses: Vec<String>,
    projections: Vec<String>,
    /// lowercase table label -> alias
    aliases: HashMap<String, String>,
}

/// Emit LEFT JOIN clauses for every additional column's pre-computed join
/// path. A projection whose path is missing or whose hop has no KG edge is
/// dropped with a warning.
fn plan_additional_joins(
    intent: &QueryIntent,
    dialect: Dialect,
    kg: &KnowledgeGraph,
    prefixes: &TablePrefixes,
    aliases: HashMap<String, String>,
) -> JoinPlan {
    let mut plan = JoinPlan { clauses: Vec::new(), projections: Vec::new(), aliases };
    let mut taken: HashSet<String> = plan.aliases.values().cloned().collect();

    'columns: for col in &intent.additional_columns {
        if is_excluded(&col.column_name) {
            tracing::info!("Dropping excluded additional column '{}'", col.column_name);
            continue;
        }
        let table_key = col.table.to_lowercase();

        if !plan.aliases.contains_key(&table_key) {
            if col.join_path.len() < 2 {
                tracing::warn!(
                    "No join path for additional column '{}' from '{}', dropping projection",
                    col.column_name,
                    col.table
                );
                continue;
            }

            let mut pending: Vec<String> = Vec::new();
            let mut pending_aliases: Vec<String> = Vec::new();
            let mut abort = false;
            for pair in col.join_path.windows(2) {
                let (from, to) = (&pair[0], &pair[1]);
                // self-join guard
                if from.to_lowercase() == to.to_lowercase() {
                    continue;
                }
                if plan.aliases.contains_key(&to.to_lowercase()) {
                    continue;
                }
                let Some(from_alias) = plan.aliases.get(&from.to_lowercase()).cloned() else {
                    tracing::warn!(
                        "Join path hop '{}' is not reachable, dropping projection '{}'",
                        from,
                        col.column_name
                    );
                    abort = true;
                    break;
                };
                let Some((from_col, to_col)) = join_condition(kg, from, to) else {
                    tracing::warn!(
                        "No KG join condition between '{}' and '{}', dropping projection '{}'",
                        from,
                        to,
                        col.column_name
                    );
                    abort = true;
                    break;
                };
                let to_alias = join_alias(to, &mut taken);
                pending.push(format!(
                    "LEFT JOIN {} {} ON {}.{} = {}.{}",
                    qualify(dialect, prefix_for(prefixes, to), to),
                    to_alias,
                    from_alias,
                    dialect.quote(&from_col),
                    to_alias,
                    dialect.quote(&to_col),
                ));
                plan.aliases.insert(to.to_lowercase(), to_alias.clone());
                pending_aliases.push(to.to_lowercase());
            }
            if abort {
                for key in pending_aliases {
                    plan.aliases.remove(&key);
                }
                continue 'columns;
            }
            plan.clauses.extend(pending);
        }

        if let Some(alias) = plan.aliases.get(&table_key) {
            let out_name = col
                .alias
                .clone()
                .unwrap_or_else(|| format!("{}_{}", col.table, col.column_name));
            plan.projections.push(format!(
                "{}.{} AS {}",
                alias,
                dialect.quote(&col.column_name),
                dialect.quote(&out_name)
            ));
        }
    }
    plan
}

fn render_filters(
    intent: &QueryIntent,
    dialect: Dialect,
    aliases: &HashMap<String, String>,
) -> Vec<String> {
    intent
        .filters
        .iter()
        .map(|f| {
            let alias = f
                .table_hint
                .as_ref()
                .and_then(|t| aliases.get(&t.to_lowercase()).cloned())
                .unwrap_or_else(|| "s".to_string());
            let comparator = f.comparator.as_deref().unwrap_or("=");
            format!(
                "{}.{} {} '{}'",
                alias,
                dialect.quote(&f.column),
                comparator,
                escape_value(&f.value)
            )
        })
        .collect()
}

/// Assemble a SELECT with dialect-correct DISTINCT/TOP/LIMIT/ROWNUM
/// placement.
fn assemble(
    dialect: Dialect,
    distinct: bool,
    projection: &str,
    from_and_joins: &str,
    mut conditions: Vec<String>,
    group_by: Option<String>,
    limit: Option<u32>,
) -> String {
    let mut select = String::from("SELECT ");
    if distinct {
        select.push_str("DISTINCT ");
    }
    if dialect == Dialect::SqlServer
        && let Some(n) = limit
    {
        select.push_str(&format!("TOP {} ", n));
    }
    select.push_str(projection);
    select.push_str(" FROM ");
    select.push_str(from_and_joins);

    if dialect == Dialect::Oracle
        && let Some(n) = limit
    {
        conditions.push(format!("ROWNUM <= {}", n));
    }

    if !conditions.is_empty() {
        select.push_str(" WHERE ");
        select.push_str(&conditions.join(" AND "));
    }

    if let Some(col) = group_by {
        select.push_str(" GROUP BY ");
        select.push_str(&col);
    }

    if matches!(dialect, Dialect::MySql | Dialect::Postgresql)
        && let Some(n) = limit
    {
        select.push_str(&format!(" LIMIT {}", n));
    }

    select
}

fn comparison_sql(
    intent: &QueryIntent,
    dialect: Dialect,
    kg: &KnowledgeGraph,
    prefixes: &TablePrefixes,
) -> EngineResult<String> {
    let target = intent.target_table.as_ref().ok_or_else(|| {
        EngineError::InvalidRequest("Comparison query requires a target table".to_string())
    })?;
    if intent.source_table.to_lowercase() == target.to_lowercase() {
        return Err(EngineError::InvalidRequest(format!(
            "Self-join comparison on '{}' is not allowed",
            intent.source_table
        )));
    }
    let (src_col, tgt_col) = intent.join_columns.first().cloned().ok_or_else(|| {
        EngineError::NoJoinPath { source_table: intent.source_table.clone(), target: target.clone() }
    })?;

    let not_in = intent.operation == Some(Operation::NotIn);
    let join_kind = if not_in { "LEFT JOIN" } else { "INNER JOIN" };

    let mut aliases = HashMap::new();
    aliases.insert(intent.source_table.to_lowercase(), "s".to_string());
    aliases.insert(target.to_lowercase(), "t".to_string());

    let plan = plan_additional_joins(intent, dialect, kg, prefixes, aliases);

    let mut projection = source_projection(intent, dialect, kg);
    if !plan.projections.is_empty() {
        projection = format!("{}, {}", projection, plan.projections.join(", "));
    }

    let mut from = format!(
        "{} s {} {} t ON s.{} = t.{}",
        qualify(dialect, prefix_for(prefixes, &intent.source_table), &intent.source_table),
        join_kind,
        qualify(dialect, prefix_for(prefixes, target), target),
        dialect.quote(&src_col),
        dialect.quote(&tgt_col),
    );
    for clause in &plan.clauses {
        from.push(' ');
        from.push_str(clause);
    }

    let mut conditions = Vec::new();
    if not_in {
        // anti-join on the first target join column
        conditions.push(format!("t.{} IS NULL", dialect.quote(&tgt_col)));
    }
    conditions.extend(render_filters(intent, dialect, &plan.aliases));

    Ok(assemble(dialect, true, &projection, &from, conditions, None, intent.limit))
}

fn filter_sql(
    intent: &QueryIntent,
    dialect: Dialect,
    kg: &KnowledgeGraph,
    prefixes: &TablePrefixes,
) -> EngineResult<String> {
    let mut aliases = HashMap::new();
    aliases.insert(intent.source_table.to_lowercase(), "s".to_string());

    let mut from =
        format!("{} s", qualify(dialect, prefix_for(prefixes, &intent.source_table), &intent.source_table));

    if let Some(target) = &intent.target_table {
        let (src_col, tgt_col) = intent.join_columns.first().cloned().ok_or_else(|| {
            EngineError::NoJoinPath { source_table: intent.source_table.clone(), target: target.clone() }
        })?;
        if intent.source_table.to_lowercase() != target.to_lowercase() {
            aliases.insert(target.to_lowercase(), "t".to_string());
            from.push_str(&format!(
                " INNER JOIN {} t ON s.{} = t.{}",
                qualify(dialect, prefix_for(prefixes, target), target),
                dialect.quote(&src_col),
                dialect.quote(&tgt_col),
            ));
        }
    }

    let plan = plan_additional_joins(intent, dialect, kg, prefixes, aliases);
    for clause in &plan.clauses {
        from.push(' ');
        from.push_str(clause);
    }

    let mut projection = source_projection(intent, dialect, kg);
    if !plan.projections.is_empty() {
        projection = format!("{}, {}", projection, plan.projections.join(", "));
    }

    let conditions = render_filters(intent, dialect, &plan.aliases);
    Ok(assemble(dialect, false, &projection, &from, conditions, None, intent.limit))
}

fn aggregation_sql(
    intent: &QueryIntent,
    dialect: Dialect,
    prefixes: &TablePrefixes,
) -> EngineResult<String> {
    let operation = intent.operation.unwrap_or(Operation::Count);
    let agg_fn = operation.aggregate_fn().unwrap_or("COUNT");

    let agg_column = intent
        .additional_columns
        .first()
        .map(|c| c.column_name.clone());

    let agg_expr = match (&agg_column, agg_fn) {
        (Some(col), f) => format!("{}({})", f, dialect.quote(col)),
        (None, "COUNT") => "COUNT(*)".to_string(),
        (None, f) => {
            return Err(EngineError::InvalidRequest(format!(
                "{} aggregation needs a column (use 'include <column> from <table>')",
                f
            )));
        },
    };

    let aliases = HashMap::from([(intent.source_table.to_lowercase(), "s".to_string())]);

    let (projection, group_by) = match &intent.group_by {
        Some(col) => (
            format!("s.{}, {}", dialect.quote(col), agg_expr),
            Some(format!("s.{}", dialect.quote(col))),
        ),
        None => (agg_expr, None),
    };

    let from =
        format!("{} s", qualify(dialect, prefix_for(prefixes, &intent.source_table), &intent.source_table));
    let conditions = render_filters(intent, dialect, &aliases);

    // aggregates take no limit unless the caller forces one
    Ok(assemble(dialect, false, &projection, &from, conditions, group_by, intent.limit))
}

fn data_sql(
    intent: &QueryIntent,
    dialect: Dialect,
    kg: &KnowledgeGraph,
    prefixes: &TablePrefixes,
) -> EngineResult<String> {
    let aliases = HashMap::from([(intent.source_table.to_lowercase(), "s".to_string())]);
    let plan = plan_additional_joins(intent, dialect, kg, prefixes, aliases);

    let mut projection = source_projection(intent, dialect, kg);
    if !plan.projections.is_empty() {
        projection = format!("{}, {}", projection, plan.projections.join(", "));
    }

    let mut from =
        format!("{} s", qualify(dialect, prefix_for(prefixes, &intent.source_table), &intent.source_table));
    for clause in &plan.clauses {
        from.push(' ');
        from.push_str(clause);
    }

    let conditions = render_filters(intent, dialect, &plan.aliases);
    Ok(assemble(dialect, false, &projection, &from, conditions, None, intent.limit))
}

// ============================================================================
// Reconciliation rule SQL (matched / unmatched_source / unmatched_target)
// ============================================================================

/// Build the SQL for one reconciliation query mode. `with_prefix` controls
/// the schema-prefixed first attempt vs the executor's unprefixed retry.
pub fn rule_sql(
    rule: &ReconciliationRule,
    mode: ReconQueryType,
    dialect: Dialect,
    with_prefix: bool,
    limit: Option<u32>,
) -> EngineResult<String> {
    if rule.source_columns.is_empty() || rule.target_columns.is_empty() {
        return Err(EngineError::InvalidRequest(format!(
            "Rule '{}' has empty column lists",
            rule.rule_name
        )));
    }
    for col in rule.source_columns.iter().chain(rule.target_columns.iter()) {
        if is_excluded(col) {
            return Err(EngineError::InvalidRequest(format!(
                "Rule '{}' references excluded field '{}'",
                rule.rule_name, col
            )));
        }
    }
    if rule.source_table.to_lowercase() == rule.target_table.to_lowercase()
        && rule.source_schema == rule.target_schema
    {
        return Err(EngineError::InvalidRequest(format!(
            "Rule '{}' would self-join table '{}'",
            rule.rule_name, rule.source_table
        )));
    }

    let src_prefix = with_prefix.then_some(rule.source_schema.as_str());
    let tgt_prefix = with_prefix.then_some(rule.target_schema.as_str());
    let source = qualify(dialect, src_prefix, &rule.source_table);
    let target = qualify(dialect, tgt_prefix, &rule.target_table);

    let on_clause: Vec<String> = rule
        .source_columns
        .iter()
        .zip(rule.target_columns.iter())
        .map(|(sc, tc)| format!("s.{} = t.{}", dialect.quote(sc), dialect.quote(tc)))
        .collect();
    let on_clause = on_clause.join(" AND ");

    let sql = match mode {
        ReconQueryType::Matched => assemble(
            dialect,
            true,
            "s.*",
            &format!("{} s INNER JOIN {} t ON {}", source, target, on_clause),
            Vec::new(),
            None,
            limit,
        ),
        ReconQueryType::UnmatchedSource => assemble(
            dialect,
            true,
            "s.*",
            &format!("{} s LEFT JOIN {} t ON {}", source, target, on_clause),
            vec![format!("t.{} IS NULL", dialect.quote(&rule.target_columns[0]))],
            None,
            limit,
        ),
        ReconQueryType::UnmatchedTarget => assemble(
            dialect,
            true,
            "t.*",
            &format!("{} t LEFT JOIN {} s ON {}", target, source, on_clause),
            vec![format!("s.{} IS NULL", dialect.quote(&rule.source_columns[0]))],
            None,
            limit,
        ),
    };

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdditionalColumn, MatchType, QueryFilter, ValidationStatus};
    use chrono::Utc;

    fn comparison_intent(operation: Operation) -> QueryIntent {
        let mut intent = QueryIntent::new(
            QueryType::ComparisonQuery,
            "brz_lnd_RBP_GPU",
            "products in RBP vs OPS Excel",
        );
        intent.operation = Some(operation);
        intent.target_table = Some("brz_lnd_OPS_EXCEL_GPU".to_string());
        intent.join_columns.push(("Material".to_string(), "PLANNING_SKU".to_string()));
        intent
    }

    fn bare_graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
        kg.add_table_node("brz_lnd_OPS_EXCEL_GPU", HashMap::new());
        kg.add_table_node("hana_material_master", HashMap::new());
        kg.add_relationship(crate::models::GraphRelationship {
            source_id: table_node_id("brz_lnd_OPS_EXCEL_GPU"),
            target_id: table_node_id("hana_material_master"),
            relationship_type: "CROSS_SCHEMA_REFERENCE".to_string(),
            properties: HashMap::new(),
            source_column: Some("PLANNING_SKU".to_string()),
            target_column: Some("MATERIAL".to_string()),
            confidence: 0.85,
            origin: crate::models::RelationshipOrigin::AutoDetected,
            cardinality: None,
            reasoning: None,
        });
        kg
    }

    #[test]
    fn sqlserver_comparison_with_target_filter() {
        let mut intent = comparison_intent(Operation::In);
        intent.filters.push(QueryFilter {
            column: "Active_Inactive".to_string(),
            value: "Active".to_string(),
            table_hint: Some("brz_lnd_OPS_EXCEL_GPU".to_string()),
            comparator: Some("=".to_string()),
        });

        let sql = generate(&intent, Dialect::SqlServer, &bare_graph()).expect("sql");
        assert_eq!(
            sql,
            "SELECT DISTINCT s.* FROM [brz_lnd_RBP_GPU] s INNER JOIN [brz_lnd_OPS_EXCEL_GPU] t \
             ON s.[Material] = t.[PLANNING_SKU] WHERE t.[Active_Inactive] = 'Active'"
        );
    }

    #[test]
    fn mysql_not_in_with_limit() {
        let mut intent = comparison_intent(Operation::NotIn);
        intent.limit = Some(1000);

        let sql = generate(&intent, Dialect::MySql, &bare_graph()).expect("sql");
        assert_eq!(
            sql,
            "SELECT DISTINCT s.* FROM `brz_lnd_RBP_GPU` s LEFT JOIN `brz_lnd_OPS_EXCEL_GPU` t \
             ON s.`Material` = t.`PLANNING_SKU` WHERE t.`PLANNING_SKU` IS NULL LIMIT 1000"
        );
    }

    #[test]
    fn oracle_limit_uses_rownum() {
        let mut intent = comparison_intent(Operation::In);
        intent.limit = Some(50);
        let sql = generate(&intent, Dialect::Oracle, &bare_graph()).expect("sql");
        assert!(sql.contains("WHERE ROWNUM <= 50"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.contains("\"brz_lnd_RBP_GPU\""));
    }

    #[test]
    fn sqlserver_top_goes_after_distinct() {
        let mut intent = comparison_intent(Operation::In);
        intent.limit = Some(10);
        let sql = generate(&intent, Dialect::SqlServer, &bare_graph()).expect("sql");
        assert!(sql.starts_with("SELECT DISTINCT TOP 10 s.*"));
    }

    #[test]
    fn additional_column_multi_hop_left_join() {
        let mut intent = comparison_intent(Operation::NotIn);
        intent.additional_columns.push(AdditionalColumn {
            table: "hana_material_master".to_string(),
            column_name: "OPS_PLANNER".to_string(),
            alias: Some("hana_material_master_OPS_PLANNER".to_string()),
            join_path: vec![
                "brz_lnd_RBP_GPU".to_string(),
                "brz_lnd_OPS_EXCEL_GPU".to_string(),
                "hana_material_master".to_string(),
            ],
        });

        let sql = generate(&intent, Dialect::SqlServer, &bare_graph()).expect("sql");
        assert!(sql.contains(
            "LEFT JOIN [hana_material_master] m ON t.[PLANNING_SKU] = m.[MATERIAL]"
        ));
        assert!(sql.contains("m.[OPS_PLANNER] AS [hana_material_master_OPS_PLANNER]"));
        assert!(!sql.contains("id = id"));
        assert!(!sql.to_lowercase().contains("on 1 = 1"));
    }

    #[test]
    fn missing_join_path_drops_projection() {
        let mut intent = comparison_intent(Operation::In);
        intent.additional_columns.push(AdditionalColumn {
            table: "hana_material_master".to_string(),
            column_name: "OPS_PLANNER".to_string(),
            alias: None,
            join_path: vec![],
        });

        let sql = generate(&intent, Dialect::SqlServer, &bare_graph()).expect("sql");
        assert!(!sql.contains("OPS_PLANNER"));
        assert!(!sql.contains("hana_material_master"));
    }

    #[test]
    fn projection_expands_and_drops_excluded_columns() {
        let mut kg = bare_graph();
        {
            let id = table_node_id("brz_lnd_RBP_GPU");
            let node = kg.nodes.iter_mut().find(|n| n.id == id).unwrap();
            node.properties.insert(
                "columns".to_string(),
                serde_json::json!(["Material", "Product_Line", "Plant"]),
            );
        }
        let intent = comparison_intent(Operation::In);
        let sql = generate(&intent, Dialect::MySql, &kg).expect("sql");
        assert!(sql.contains("s.`Material`, s.`Plant`"));
        assert!(!sql.contains("Product_Line"));
    }

    #[test]
    fn aggregation_without_limit_by_default() {
        let mut intent =
            QueryIntent::new(QueryType::AggregationQuery, "brz_lnd_RBP_GPU", "count of products");
        intent.operation = Some(Operation::Count);
        let sql = generate(&intent, Dialect::MySql, &bare_graph()).expect("sql");
        assert_eq!(sql, "SELECT COUNT(*) FROM `brz_lnd_RBP_GPU` s");
    }

    #[test]
    fn aggregation_group_by() {
        let mut intent =
            QueryIntent::new(QueryType::AggregationQuery, "brz_lnd_RBP_GPU", "count per plant");
        intent.operation = Some(Operation::Count);
        intent.group_by = Some("Plant".to_string());
        let sql = generate(&intent, Dialect::MySql, &bare_graph()).expect("sql");
        assert_eq!(
            sql,
            "SELECT s.`Plant`, COUNT(*) FROM `brz_lnd_RBP_GPU` s GROUP BY s.`Plant`"
        );
    }

    #[test]
    fn sum_without_column_is_invalid() {
        let mut intent = QueryIntent::new(QueryType::AggregationQuery, "t1", "sum of stuff");
        intent.operation = Some(Operation::Sum);
        assert!(matches!(
            generate(&intent, Dialect::MySql, &bare_graph()),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn schema_prefix_qualifies_tables() {
        let intent = comparison_intent(Operation::In);
        let mut prefixes = TablePrefixes::new();
        prefixes.insert("brz_lnd_rbp_gpu".to_string(), "newdq".to_string());
        let sql =
            generate_with_prefixes(&intent, Dialect::MySql, &bare_graph(), &prefixes).expect("sql");
        assert!(sql.contains("`newdq`.`brz_lnd_RBP_GPU` s"));
        // target had no prefix entry
        assert!(sql.contains("JOIN `brz_lnd_OPS_EXCEL_GPU` t"));
    }

    fn rule() -> ReconciliationRule {
        ReconciliationRule {
            rule_id: "RULE_12345678".to_string(),
            rule_name: "material_match".to_string(),
            source_schema: "newdqschema".to_string(),
            source_table: "brz_lnd_RBP_GPU".to_string(),
            source_columns: vec!["Material".to_string()],
            target_schema: "newdqschema".to_string(),
            target_table: "hana_material_master".to_string(),
            target_columns: vec!["MATERIAL".to_string()],
            match_type: MatchType::Exact,
            confidence: 0.9,
            reasoning: String::new(),
            validation_status: ValidationStatus::Valid,
            llm_generated: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rule_sql_three_modes() {
        let r = rule();
        let matched =
            rule_sql(&r, ReconQueryType::Matched, Dialect::MySql, true, None).expect("sql");
        assert_eq!(
            matched,
            "SELECT DISTINCT s.* FROM `newdqschema`.`brz_lnd_RBP_GPU` s INNER JOIN \
             `newdqschema`.`hana_material_master` t ON s.`Material` = t.`MATERIAL`"
        );

        let unmatched_src =
            rule_sql(&r, ReconQueryType::UnmatchedSource, Dialect::MySql, false, Some(100))
                .expect("sql");
        assert_eq!(
            unmatched_src,
            "SELECT DISTINCT s.* FROM `brz_lnd_RBP_GPU` s LEFT JOIN `hana_material_master` t \
             ON s.`Material` = t.`MATERIAL` WHERE t.`MATERIAL` IS NULL LIMIT 100"
        );

        let unmatched_tgt =
            rule_sql(&r, ReconQueryType::UnmatchedTarget, Dialect::MySql, false, None)
                .expect("sql");
        assert!(unmatched_tgt.starts_with("SELECT DISTINCT t.* FROM `hana_material_master` t"));
        assert!(unmatched_tgt.contains("WHERE s.`Material` IS NULL"));
    }

    #[test]
    fn rule_sql_rejects_excluded_fields() {
        let mut r = rule();
        r.source_columns = vec!["Product_Line".to_string()];
        assert!(matches!(
            rule_sql(&r, ReconQueryType::Matched, Dialect::MySql, true, None),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn value_escaping_doubles_quotes() {
        let mut intent = QueryIntent::new(QueryType::FilterQuery, "brz_lnd_RBP_GPU", "x");
        intent.filters.push(QueryFilter {
            column: "Name".to_string(),
            value: "O'Brien".to_string(),
            table_hint: None,
            comparator: Some("=".to_string()),
        });
        let sql = generate(&intent, Dialect::MySql, &bare_graph()).expect("sql");
        assert!(sql.contains("'O''Brien'"));
    }
}
