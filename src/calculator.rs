//! Demo `add` and `subtract` methods served by the binary

use serde::Deserialize;
use serde_json::json;

use crate::api::Server;
use crate::protocol::{CallContext, Request, Response};

#[derive(Debug, Deserialize)]
pub struct OperandParams {
    pub a: i64,
    pub b: i64,
}

pub fn register_methods<S: Server>(server: &mut S) {
    server.register("add", add);
    server.register("subtract", subtract);
}

pub async fn add(_ctx: CallContext, request: Request) -> Response {
    let result = request
        .params::<OperandParams>()
        .map(|params| json!(params.a.wrapping_add(params.b)));
    Response::from_result(request.id, result)
}

pub async fn subtract(_ctx: CallContext, request: Request) -> Response {
    let result = request
        .params::<OperandParams>()
        .map(|params| json!(params.a.wrapping_sub(params.b)));
    Response::from_result(request.id, result)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::ErrorCode;

    fn request(params: serde_json::Value) -> Request {
        Request::new("add")
            .with_params(&params)
            .expect("params encode")
            .with_id(4)
    }

    #[tokio::test]
    async fn add_sums_operands() {
        let response = add(CallContext::background(), request(json!({"a": 5, "b": 3}))).await;
        assert_eq!(response.result(), Some(&json!(8)));
    }

    #[tokio::test]
    async fn subtract_takes_difference() {
        let response = subtract(CallContext::background(), request(json!({"a": 10, "b": 4}))).await;
        assert_eq!(response.result(), Some(&json!(6)));
    }

    #[tokio::test]
    async fn string_params_are_invalid() {
        let response = add(CallContext::background(), request(json!("invalid"))).await;
        assert_eq!(
            response.error().map(|err| err.code),
            Some(ErrorCode::InvalidParams)
        );
        assert_eq!(response.id(), &crate::protocol::Id::from(4));
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let response = add(CallContext::background(), Request::new("add").with_id(5)).await;
        assert_eq!(
            response.error().map(|err| err.code),
            Some(ErrorCode::InvalidParams)
        );
    }
}
