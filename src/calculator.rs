//! Four-operator calculator tool.
//!
//! `POST /calculator` with `{"operand1": 2, "operand2": 3, "operator": "*"}`
//! answers `{"result": 6.0}`. Every rejection is a [`CalcError`], turned into
//! a JSON `{"error": "..."}` body at the handler boundary; nothing here ever
//! fails the connection.

use std::str::FromStr;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize, de};
use serde_json::Value;
use tracing::{debug, error};

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Why a calculation was rejected. The `Display` text is what the client sees.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid request format")]
    InvalidFormat(#[source] serde_json::Error),

    #[error("Invalid operator. Use +, -, *, or /")]
    UnsupportedOperator(String),

    #[error("Division by zero is not allowed")]
    DivisionByZero,
}

impl CalcError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidFormat(_) | Self::UnsupportedOperator(_) | Self::DivisionByZero => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for CalcError {
    fn into_response(self) -> Response {
        match self {
            // Rejected before the body is looked at, so no JSON envelope.
            Self::MethodNotAllowed => Response::builder()
                .status(self.status())
                .text(self.to_string()),
            _ => json_response(self.status(), &CalculationResult::failure(&self)),
        }
    }
}

// ── Operator ──────────────────────────────────────────────────────────────────

/// The supported binary operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add      => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide   => "/",
        }
    }

    /// Applies the operation. Division checks for an exact-zero divisor
    /// (`0.0` or `-0.0`) before dividing.
    pub fn apply(self, lhs: f64, rhs: f64) -> Result<f64, CalcError> {
        match self {
            Self::Add      => Ok(lhs + rhs),
            Self::Subtract => Ok(lhs - rhs),
            Self::Multiply => Ok(lhs * rhs),
            Self::Divide if rhs == 0.0 => Err(CalcError::DivisionByZero),
            Self::Divide   => Ok(lhs / rhs),
        }
    }
}

impl FromStr for Operator {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Add),
            "-" => Ok(Self::Subtract),
            "*" => Ok(Self::Multiply),
            "/" => Ok(Self::Divide),
            other => Err(CalcError::UnsupportedOperator(other.to_owned())),
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// Request body. Missing fields take their zero value, so an absent operator
/// is reported as unsupported rather than as a format error. Decode with
/// [`CalculationRequest::from_json`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CalculationRequest {
    pub operand1: f64,
    pub operand2: f64,
    pub operator: String,
}

impl CalculationRequest {
    /// Decodes the first JSON value in `body` leniently:
    ///
    /// - keys match field names regardless of ASCII case (`"Operand1"`);
    /// - `null` fields, and a `null` body, leave the zero value;
    /// - unknown keys and bytes after the first value are ignored.
    ///
    /// Anything other than an object or `null` is an error.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value = serde_json::Deserializer::from_slice(body)
            .into_iter::<Value>()
            .next()
            .ok_or_else(|| <serde_json::Error as de::Error>::custom("empty request body"))??;

        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(fields) => serde_json::from_value(Value::Object(
                fields
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.to_ascii_lowercase(), v))
                    .collect(),
            )),
            _ => Err(de::Error::custom("expected a JSON object")),
        }
    }

    pub fn evaluate(&self) -> Result<f64, CalcError> {
        let operator: Operator = self.operator.parse()?;
        operator.apply(self.operand1, self.operand2)
    }
}

/// Response body: either `{"result": ...}` or `{"error": "..."}`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CalculationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CalculationResult {
    pub fn success(result: f64) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn failure(err: &CalcError) -> Self {
        Self { result: None, error: Some(err.to_string()) }
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// `/calculator` handler.
pub async fn handle(req: Request) -> Response {
    match calculate(&req) {
        Ok(result) if !result.is_finite() => {
            // Finite operands can still overflow; JSON has no infinity.
            error!(result, "calculation result is not representable as JSON");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &CalculationResult {
                    result: None,
                    error: Some("Result is not a finite number".to_owned()),
                },
            )
        }
        Ok(result) => json_response(StatusCode::OK, &CalculationResult::success(result)),
        Err(e) => {
            debug!(error = %e, "calculation rejected");
            e.into_response()
        }
    }
}

fn calculate(req: &Request) -> Result<f64, CalcError> {
    if req.method() != Method::POST {
        return Err(CalcError::MethodNotAllowed);
    }
    CalculationRequest::from_json(req.body())
        .map_err(CalcError::InvalidFormat)?
        .evaluate()
}

fn json_response(status: StatusCode, body: &CalculationResult) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder().status(status).json(bytes),
        Err(e) => {
            error!("failed to encode calculator response: {e}");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::{Value, json};

    use super::*;

    fn post(body: &str) -> Request {
        Request::from_http(
            http::Request::post("/calculator")
                .body(Bytes::copy_from_slice(body.as_bytes()))
                .unwrap(),
        )
    }

    fn body_json(res: &Response) -> Value {
        serde_json::from_slice(res.body_bytes().expect("buffered body")).unwrap()
    }

    fn calc(operand1: f64, operand2: f64, operator: &str) -> Result<f64, CalcError> {
        CalculationRequest { operand1, operand2, operator: operator.to_owned() }.evaluate()
    }

    #[test]
    fn evaluates_all_operators() {
        assert_eq!(calc(1.5, 2.25, "+").unwrap(), 1.5 + 2.25);
        assert_eq!(calc(1.5, 2.25, "-").unwrap(), 1.5 - 2.25);
        assert_eq!(calc(1.5, 2.25, "*").unwrap(), 1.5 * 2.25);
        assert_eq!(calc(1.0, 3.0, "/").unwrap(), 1.0 / 3.0);
        assert_eq!(calc(0.1, 0.2, "+").unwrap(), 0.1 + 0.2);
    }

    #[test]
    fn division_by_exact_zero_is_rejected() {
        assert!(matches!(calc(10.0, 0.0, "/"), Err(CalcError::DivisionByZero)));
        assert!(matches!(calc(10.0, -0.0, "/"), Err(CalcError::DivisionByZero)));
        assert!(matches!(calc(0.0, 0.0, "/"), Err(CalcError::DivisionByZero)));
        assert_eq!(calc(10.0, 1e-300, "/").unwrap(), 10.0 / 1e-300);
    }

    #[test]
    fn unknown_operators_are_rejected() {
        for op in ["%", "x", "plus", "", "++", " +"] {
            match calc(1.0, 2.0, op) {
                Err(CalcError::UnsupportedOperator(got)) => assert_eq!(got, op),
                other => panic!("{op:?}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in [Operator::Add, Operator::Subtract, Operator::Multiply, Operator::Divide] {
            assert_eq!(op.symbol().parse::<Operator>().unwrap(), op);
        }
    }

    #[tokio::test]
    async fn multiply_example() {
        let res = handle(post(r#"{"operand1":2,"operand2":3,"operator":"*"}"#)).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(body_json(&res), json!({ "result": 6.0 }));
    }

    #[tokio::test]
    async fn division_by_zero_example() {
        let res = handle(post(r#"{"operand1":10,"operand2":0,"operator":"/"}"#)).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&res), json!({ "error": "Division by zero is not allowed" }));
    }

    #[tokio::test]
    async fn invalid_operator_response() {
        let res = handle(post(r#"{"operand1":1,"operand2":2,"operator":"^"}"#)).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&res), json!({ "error": "Invalid operator. Use +, -, *, or /" }));
    }

    #[tokio::test]
    async fn malformed_bodies_are_invalid_format() {
        let bodies = [
            "",
            "   ",
            "not json",
            r#"{"operand1":"two","operand2":3,"operator":"+"}"#,
            r#"{"operand1":1"#,
            r#"[1, 2, "+"]"#,
            "42",
        ];
        for body in bodies {
            let res = handle(post(body)).await;
            assert_eq!(res.status_code(), StatusCode::BAD_REQUEST, "{body:?}");
            assert_eq!(body_json(&res), json!({ "error": "Invalid request format" }), "{body:?}");
        }
    }

    #[tokio::test]
    async fn missing_fields_default_to_zero() {
        let res = handle(post(r#"{"operand2":4,"operator":"-"}"#)).await;
        assert_eq!(body_json(&res), json!({ "result": -4.0 }));

        let res = handle(post(r#"{"operand1":1,"operand2":2}"#)).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&res), json!({ "error": "Invalid operator. Use +, -, *, or /" }));

        let res = handle(post(r#"{"operand1":null,"operand2":4,"operator":"+"}"#)).await;
        assert_eq!(body_json(&res), json!({ "result": 4.0 }));
    }

    #[tokio::test]
    async fn null_body_is_an_unsupported_operator() {
        let res = handle(post("null")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&res), json!({ "error": "Invalid operator. Use +, -, *, or /" }));
    }

    #[tokio::test]
    async fn keys_match_regardless_of_case() {
        let res = handle(post(r#"{"Operand1":10,"operand2":2,"operator":"-"}"#)).await;
        assert_eq!(body_json(&res), json!({ "result": 8.0 }));

        let res = handle(post(r#"{"OPERAND1":3,"Operand2":4,"Operator":"*"}"#)).await;
        assert_eq!(body_json(&res), json!({ "result": 12.0 }));
    }

    #[test]
    fn trailing_bytes_and_unknown_keys_are_ignored() {
        let req = CalculationRequest::from_json(
            br#"{"operand1":1,"operand2":2,"operator":"+","note":"hi"} trailing"#,
        )
        .unwrap();
        assert_eq!(req.evaluate().unwrap(), 3.0);
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS] {
            let req = Request::from_http(
                http::Request::builder()
                    .method(method.clone())
                    .uri("/calculator")
                    .body(Bytes::from_static(br#"{"operand1":1,"operand2":1,"operator":"+"}"#))
                    .unwrap(),
            );
            let res = handle(req).await;
            assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(res.body_bytes().map(|b| &b[..]), Some(&b"Method not allowed"[..]));
            assert_eq!(res.header("access-control-allow-origin"), None);
        }
    }

    #[tokio::test]
    async fn repeated_requests_are_identical() {
        let body = r#"{"operand1":7.5,"operand2":2.5,"operator":"/"}"#;
        let first = handle(post(body)).await;
        let second = handle(post(body)).await;

        assert_eq!(first.status_code(), second.status_code());
        assert_eq!(first.body_bytes(), second.body_bytes());
        assert_eq!(body_json(&first), json!({ "result": 3.0 }));
    }

    #[tokio::test]
    async fn overflow_is_a_server_error() {
        let res = handle(post(r#"{"operand1":1e308,"operand2":10,"operator":"*"}"#)).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&res), json!({ "error": "Result is not a finite number" }));
    }
}
