//! Filter model
//!
//! Normalizes global-search plus per-column filter clauses into one
//! declarative structure. Evaluation is pure and total: Null and missing
//! cells are treated as "empty" and never fail a row. The only error is a
//! clause whose operator is not defined for its column's type, which is a
//! programmer error caught during validation.

use serde::{Deserialize, Serialize};

use crate::column::{ColumnDef, ColumnType};
use crate::error::{GridError, Result};
use crate::value::{CellValue, Row};

/// Filter operators across all column types. Each `ColumnType` admits a
/// fixed subset; see [`FilterOperator::supports`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    #[default]
    Equals,
    NotEquals,

    // Text
    Contains,
    StartsWith,
    EndsWith,

    // Number
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,

    // Select
    In,
    NotIn,

    // Boolean tri-state (true | false | any)
    Is,

    // Date
    After,
    Before,

    // Shared
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    /// Whether this operator is defined for the given column type. The
    /// per-type sets are a fixed contract.
    pub fn supports(&self, column_type: ColumnType) -> bool {
        use FilterOperator::*;
        match column_type {
            ColumnType::Text => matches!(
                self,
                Equals | NotEquals | Contains | StartsWith | EndsWith | IsEmpty | IsNotEmpty
            ),
            ColumnType::Number => matches!(
                self,
                Equals
                    | NotEquals
                    | GreaterThan
                    | LessThan
                    | GreaterOrEqual
                    | LessOrEqual
                    | IsEmpty
                    | IsNotEmpty
            ),
            ColumnType::Select => {
                matches!(self, Equals | NotEquals | In | NotIn | IsEmpty | IsNotEmpty)
            }
            ColumnType::Boolean => matches!(self, Is),
            ColumnType::Date => matches!(
                self,
                Equals | NotEquals | After | Before | IsEmpty | IsNotEmpty
            ),
        }
    }

    /// Operators that test emptiness and take no comparison value
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

/// Comparison value of a filter clause. `Many` backs the `in`/`notIn`
/// operators; everything else uses `Single`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(CellValue),
    Many(Vec<CellValue>),
}

impl FilterValue {
    pub fn single(value: impl Into<CellValue>) -> Self {
        FilterValue::Single(value.into())
    }

    pub fn many<V: Into<CellValue>>(values: impl IntoIterator<Item = V>) -> Self {
        FilterValue::Many(values.into_iter().map(Into::into).collect())
    }

    fn as_single(&self) -> &CellValue {
        match self {
            FilterValue::Single(v) => v,
            FilterValue::Many(_) => &CellValue::Null,
        }
    }
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Single(CellValue::Null)
    }
}

/// A single filter clause against one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Unique clause id, assigned by the caller/UI
    pub id: String,
    pub column_id: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: FilterValue,
}

impl FilterClause {
    pub fn new(
        id: impl Into<String>,
        column_id: impl Into<String>,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Self {
        Self {
            id: id.into(),
            column_id: column_id.into(),
            operator,
            value,
        }
    }
}

/// Logical combinator across clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

impl FilterLogic {
    pub fn toggle(&self) -> Self {
        match self {
            FilterLogic::And => FilterLogic::Or,
            FilterLogic::Or => FilterLogic::And,
        }
    }
}

/// Per-column filter state with a draft area.
///
/// `filters`/`logic` are what query execution sees; `pending_filters`/
/// `pending_logic` hold the draft the user is editing. The applied fields
/// change only through [`apply_pending`](Self::apply_pending) or
/// [`clear`](Self::clear), decoupling live editing from execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ColumnFilterState {
    pub filters: Vec<FilterClause>,
    pub logic: FilterLogic,
    pub pending_filters: Vec<FilterClause>,
    pub pending_logic: FilterLogic,
}

impl ColumnFilterState {
    pub fn edit_pending(&mut self, filters: Vec<FilterClause>, logic: FilterLogic) {
        self.pending_filters = filters;
        self.pending_logic = logic;
    }

    /// Promote the draft to the applied filter set
    pub fn apply_pending(&mut self) {
        self.filters = self.pending_filters.clone();
        self.logic = self.pending_logic;
    }

    /// Drop both the applied and draft filter sets
    pub fn clear(&mut self) {
        self.filters.clear();
        self.pending_filters.clear();
        self.logic = FilterLogic::default();
        self.pending_logic = FilterLogic::default();
    }

    pub fn is_active(&self) -> bool {
        !self.filters.is_empty()
    }
}

/// Declarative request shape handed to remote collaborators. The remote
/// side chooses how to satisfy it; results it returns are authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterDescriptor {
    pub filters: Vec<FilterClause>,
    pub logic: FilterLogic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_filter: Option<String>,
}

/// Build the declarative descriptor for the current filter state
pub fn build_filter_descriptor(
    state: &ColumnFilterState,
    global_filter: Option<&str>,
) -> FilterDescriptor {
    FilterDescriptor {
        filters: state.filters.clone(),
        logic: state.logic,
        global_filter: global_filter
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
    }
}

/// Validate every clause against its column's type. Unknown columns and
/// unsupported operator/type combinations fail fast here, before any
/// evaluation or fetch.
pub fn validate_clauses(clauses: &[FilterClause], defs: &[ColumnDef]) -> Result<()> {
    for clause in clauses {
        let def = defs
            .iter()
            .find(|d| d.id == clause.column_id)
            .ok_or_else(|| GridError::UnknownColumn(clause.column_id.clone()))?;
        if !clause.operator.supports(def.column_type) {
            return Err(GridError::InvalidFilterOperator {
                operator: clause.operator,
                column_type: def.column_type,
            });
        }
    }
    Ok(())
}

/// Evaluate one clause against a row. Total for every supported
/// operator/type combination; Null and missing cells count as empty.
pub fn clause_matches(row: &Row, clause: &FilterClause, column_type: ColumnType) -> Result<bool> {
    use FilterOperator::*;

    if !clause.operator.supports(column_type) {
        return Err(GridError::InvalidFilterOperator {
            operator: clause.operator,
            column_type,
        });
    }

    let cell = row.get(&clause.column_id);

    if clause.operator.is_unary() {
        return Ok(match clause.operator {
            IsEmpty => cell.is_empty(),
            IsNotEmpty => !cell.is_empty(),
            _ => unreachable!(),
        });
    }

    let matched = match column_type {
        ColumnType::Text => text_op_matches(&cell_to_text(cell), clause),
        ColumnType::Number => {
            let (Some(lhs), Some(rhs)) = (cell.as_f64(), clause.value.as_single().as_f64()) else {
                // notEquals is vacuously true when either side is missing
                return Ok(clause.operator == NotEquals && !cell.is_empty());
            };
            match clause.operator {
                Equals => lhs == rhs,
                NotEquals => lhs != rhs,
                GreaterThan => lhs > rhs,
                LessThan => lhs < rhs,
                GreaterOrEqual => lhs >= rhs,
                LessOrEqual => lhs <= rhs,
                _ => unreachable!(),
            }
        }
        ColumnType::Select => {
            let cell_text = cell_to_text(cell);
            match clause.operator {
                Equals => !cell.is_empty() && cell_text == cell_to_text(clause.value.as_single()),
                NotEquals => cell_text != cell_to_text(clause.value.as_single()),
                In | NotIn => {
                    let set: Vec<String> = match &clause.value {
                        FilterValue::Many(vs) => vs.iter().map(cell_to_text).collect(),
                        FilterValue::Single(v) => vec![cell_to_text(v)],
                    };
                    let contained = !cell.is_empty() && set.contains(&cell_text);
                    if clause.operator == In { contained } else { !contained }
                }
                _ => unreachable!(),
            }
        }
        ColumnType::Boolean => {
            // `is` with a Null value means "any"
            match clause.value.as_single().as_bool() {
                None => true,
                Some(expected) => cell.as_bool() == Some(expected),
            }
        }
        ColumnType::Date => {
            let (Some(lhs), Some(rhs)) = (
                cell.as_date(),
                clause.value.as_single().as_date(),
            ) else {
                return Ok(clause.operator == NotEquals && !cell.is_empty());
            };
            match clause.operator {
                Equals => lhs == rhs,
                NotEquals => lhs != rhs,
                After => lhs > rhs,
                Before => lhs < rhs,
                _ => unreachable!(),
            }
        }
    };

    Ok(matched)
}

fn cell_to_text(cell: &CellValue) -> String {
    cell.to_string()
}

fn text_op_matches(cell_text: &str, clause: &FilterClause) -> bool {
    use FilterOperator::*;
    let needle = cell_to_text(clause.value.as_single());
    match clause.operator {
        Equals => cell_text == needle,
        NotEquals => cell_text != needle,
        Contains => cell_text.to_lowercase().contains(&needle.to_lowercase()),
        StartsWith => cell_text.to_lowercase().starts_with(&needle.to_lowercase()),
        EndsWith => cell_text.to_lowercase().ends_with(&needle.to_lowercase()),
        _ => false,
    }
}

/// Whether a row matches the global search text: case-insensitive
/// substring over every global-filterable column.
pub fn global_filter_matches(row: &Row, needle: &str, defs: &[ColumnDef]) -> bool {
    if needle.is_empty() {
        return true;
    }
    let needle = needle.to_lowercase();
    defs.iter()
        .filter(|d| d.global_filterable)
        .any(|d| row.get(&d.id).to_string().to_lowercase().contains(&needle))
}

/// Whether a row matches all (And) or any (Or) of the clauses. An empty
/// clause list matches everything.
pub fn row_matches(
    row: &Row,
    clauses: &[FilterClause],
    logic: FilterLogic,
    defs: &[ColumnDef],
) -> Result<bool> {
    if clauses.is_empty() {
        return Ok(true);
    }
    let mut any = false;
    for clause in clauses {
        let column_type = defs
            .iter()
            .find(|d| d.id == clause.column_id)
            .map(|d| d.column_type)
            .ok_or_else(|| GridError::UnknownColumn(clause.column_id.clone()))?;
        let matched = clause_matches(row, clause, column_type)?;
        match logic {
            FilterLogic::And if !matched => return Ok(false),
            FilterLogic::Or if matched => any = true,
            _ => {}
        }
    }
    Ok(match logic {
        FilterLogic::And => true,
        FilterLogic::Or => any,
    })
}

/// Local-mode filter application: clauses plus global search, in one pass
pub fn apply_filters(
    rows: &[Row],
    clauses: &[FilterClause],
    logic: FilterLogic,
    global_filter: Option<&str>,
    defs: &[ColumnDef],
) -> Result<Vec<Row>> {
    validate_clauses(clauses, defs)?;
    let needle = global_filter.unwrap_or("");
    let mut out = Vec::new();
    for row in rows {
        if !global_filter_matches(row, needle, defs) {
            continue;
        }
        if row_matches(row, clauses, logic, defs)? {
            out.push(row.clone());
        }
    }
    Ok(out)
}
