use identifier::Identifier;
use serde::{Deserialize, Serialize};

use crate::bincode::BinCodeSerAndDeser;

/// A stored 3-dimensional point: `(year, rating, price)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub year: i32,
    pub rating: f32,
    pub price: f32,
}

impl Point {
    pub fn coords(&self) -> [f64; 3] {
        [self.year as f64, self.rating as f64, self.price as f64]
    }
}

/// Subset of `{year, rating, price}` a caller may constrain an update to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub year: Option<i32>,
    pub rating: Option<f32>,
    pub price: Option<f32>,
}

/// Fields a caller may overwrite on matching points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFields {
    pub year: Option<i32>,
    pub rating: Option<f32>,
    pub price: Option<f32>,
    pub review: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Failure,
}

/// The operation catalog of §6: every message a node can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Join {
        joining_node_id: Identifier,
    },
    Presence {
        joining_node_id: Identifier,
    },
    UpdateRoutingRow {
        row_idx: usize,
        row: Vec<Option<Identifier>>,
    },
    UpdateRoutingEntry {
        row_idx: usize,
        node_id: Identifier,
    },
    UpdateLeafSet {
        lmin: Vec<Identifier>,
        lmax: Vec<Identifier>,
        key: Identifier,
    },
    GetLeafSet,
    Distance {
        node_position: f64,
    },
    Leave {
        leaving_node_id: Identifier,
    },
    InsertKey {
        key: Identifier,
        point: Point,
        review: String,
        country: String,
    },
    UpdateKey {
        key: Identifier,
        criteria: Option<Criteria>,
        data: UpdateFields,
    },
    DeleteKey {
        key: Identifier,
    },
    Lookup {
        key: Identifier,
        lower_bounds: Point,
        upper_bounds: Point,
        n: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub operation: Operation,
    pub hops: Vec<Identifier>,
}

impl Request {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            hops: Vec::new(),
        }
    }
}

/// The union of everything a response payload might carry; unused fields
/// stay at their default for operations that don't produce them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[default]
    Empty,
    RoutingRow(Vec<Option<Identifier>>),
    LeafSet {
        lmin: Vec<Identifier>,
        lmax: Vec<Identifier>,
    },
    Distance {
        distance: f64,
        neighborhood_set: Vec<Identifier>,
    },
    Lookup {
        points: Vec<Point>,
        reviews: Vec<String>,
        similar: Vec<String>,
    },
    /// Accumulated routing-table rows (one per hop traversed) and, once
    /// the join traversal reaches its terminal node, that node's leaf set.
    Join {
        rows: Vec<(usize, Vec<Option<Identifier>>)>,
        leaf_set: Option<(Vec<Identifier>, Vec<Identifier>)>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    pub hops: Vec<Identifier>,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn success(message: impl Into<String>, hops: Vec<Identifier>, payload: ResponsePayload) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            hops,
            payload,
        }
    }

    pub fn failure(message: impl Into<String>, hops: Vec<Identifier>) -> Self {
        Self {
            status: Status::Failure,
            message: message.into(),
            hops,
            payload: ResponsePayload::Empty,
        }
    }
}

impl<'a> BinCodeSerAndDeser<'a> for Request {}
impl<'a> BinCodeSerAndDeser<'a> for Response {}
