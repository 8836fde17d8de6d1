use std::fmt::{self, Display};

use serde_json::{Map, Value};

use crate::error::StoreError;

/// One record as returned by the row API. Shape is owned by the schema, not by us.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Single-table read: at most one equality filter, at most one ordering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    table: String,
    filter: Option<Filter>,
    order: Option<Order>,
    single: bool,
}

impl QueryRequest {
    pub fn select(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order: None,
            single: false,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    /// Caller expects zero or one row back.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn ordering(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Rejects names that could smuggle operators or paths into the request URL.
    pub fn validate(&self) -> Result<(), StoreError> {
        check_identifier(&self.table)?;

        if let Some(filter) = &self.filter {
            check_identifier(&filter.column)?;
        }

        if let Some(order) = &self.order {
            check_identifier(&order.column)?;
        }

        Ok(())
    }

    /// Query string pairs understood by the row API.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];

        if let Some(filter) = &self.filter {
            params.push((filter.column.clone(), format!("eq.{}", filter.value)));
        }

        if let Some(order) = &self.order {
            params.push((
                "order".to_string(),
                format!("{}.{}", order.column, order.direction.as_str()),
            ));
        }

        // two is enough to tell "one" from "many"
        if self.single {
            params.push(("limit".to_string(), "2".to_string()));
        }

        params
    }
}

impl Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)?;

        if let Some(filter) = &self.filter {
            write!(f, " where {} = {}", filter.column, filter.value)?;
        }

        if let Some(order) = &self.order {
            write!(f, " order by {} {}", order.column, order.direction.as_str())?;
        }

        if self.single {
            write!(f, " (single)")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(Vec<Row>),
    Single(Option<Row>),
}

impl QueryResult {
    pub fn from_rows(request: &QueryRequest, mut rows: Vec<Row>) -> Result<Self, StoreError> {
        if !request.is_single() {
            return Ok(Self::Rows(rows));
        }

        match rows.len() {
            0 => Ok(Self::Single(None)),
            1 => Ok(Self::Single(rows.pop())),
            _ => Err(StoreError::MultipleRows {
                table: request.table().to_string(),
            }),
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Single(row) => row.into_iter().collect(),
        }
    }

    pub fn into_single(self) -> Option<Row> {
        match self {
            Self::Rows(mut rows) => {
                if rows.is_empty() {
                    None
                } else {
                    Some(rows.swap_remove(0))
                }
            }
            Self::Single(row) => row,
        }
    }
}

fn check_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();

    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
