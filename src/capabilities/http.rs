//! `http` module: outbound requests through the invocation's client
//!
//! Every call races the invocation's cancellation token. Non-2xx statuses
//! are ordinary responses; only transport failures and invalid requests
//! produce the `(nil, err)` form.

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{cancelled_error, fail, field, lua_string, ok, Fallible, ModuleEnv};
use crate::functions::marshal::lua_to_json;
use crate::outbound::{HttpRequest, HttpResponse};

fn build_request(method: &str, url: &LuaValue, body: &LuaValue, headers: &LuaValue) -> HttpRequest {
    let mut request = HttpRequest::new(method, lua_string(url));

    if let LuaValue::Table(headers) = headers {
        for (name, value) in headers
            .pairs::<LuaValue, LuaValue>()
            .filter_map(Result::ok)
        {
            let name = lua_string(&name);
            if !name.is_empty() {
                request.headers.insert(name, lua_string(&value));
            }
        }
    }

    match body {
        LuaValue::Nil => {}
        LuaValue::Table(_) => {
            let has_content_type = request
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                request
                    .headers
                    .insert("Content-Type".into(), "application/json".into());
            }
            request.body = Some(lua_to_json(body).to_string());
        }
        other => request.body = Some(lua_string(other)),
    }

    request
}

fn response_table(lua: &Lua, response: HttpResponse) -> LuaResult<Table> {
    let table = lua.create_table()?;
    table.set("status", response.status)?;
    table.set("body", response.body)?;
    table.set("headers", lua.create_table_from(response.headers)?)?;
    Ok(table)
}

async fn perform(lua: &Lua, env: &ModuleEnv, request: HttpRequest) -> LuaResult<Fallible<Table>> {
    if let Err(e) = request.validate() {
        return Ok(fail(e));
    }
    match env.send(request).await.map_err(cancelled_error)? {
        Ok(response) => Ok(ok(response_table(lua, response)?)),
        Err(e) => Ok(fail(e)),
    }
}

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    let table = lua.create_table()?;

    for (name, method) in [("get", "GET"), ("delete", "DELETE")] {
        let env = env.clone();
        table.set(
            name,
            lua.create_async_function(move |lua, (url, headers): (LuaValue, LuaValue)| {
                let env = env.clone();
                async move {
                    let request = build_request(method, &url, &LuaValue::Nil, &headers);
                    perform(&lua, &env, request).await
                }
            })?,
        )?;
    }

    for (name, method) in [("post", "POST"), ("put", "PUT"), ("patch", "PATCH")] {
        let env = env.clone();
        table.set(
            name,
            lua.create_async_function(
                move |lua, (url, body, headers): (LuaValue, LuaValue, LuaValue)| {
                    let env = env.clone();
                    async move {
                        let request = build_request(method, &url, &body, &headers);
                        perform(&lua, &env, request).await
                    }
                },
            )?,
        )?;
    }

    let env = env.clone();
    table.set(
        "request",
        lua.create_async_function(move |lua, options: LuaValue| {
            let env = env.clone();
            async move {
                let LuaValue::Table(options) = options else {
                    return Ok(fail("options must be a table"));
                };
                let method = match lua_string(&field(&options, "method")) {
                    m if m.is_empty() => "GET".to_string(),
                    m => m,
                };
                let request = build_request(
                    &method,
                    &field(&options, "url"),
                    &field(&options, "body"),
                    &field(&options, "headers"),
                );
                perform(&lua, &env, request).await
            }
        })?,
    )?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use crate::capabilities::testing::{fixture, fixture_with, RecordingClient};

    #[tokio::test]
    async fn test_get_returns_response_table() {
        let fx = fixture_with(RecordingClient::responding(404, "missing"), "fn_http");
        let (status, body, content_type): (u16, String, String) = fx
            .lua
            .load(
                r#"
                local res, err = http.get("https://api.example.com/data", {Accept = "text/plain"})
                return res.status, res.body, res.headers["content-type"]
                "#,
            )
            .eval_async()
            .await
            .unwrap();

        assert_eq!(status, 404);
        assert_eq!(body, "missing");
        assert_eq!(content_type, "application/json");

        let sent = fx.client.sent();
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].headers["Accept"], "text/plain");
        assert!(sent[0].body.is_none());
    }

    #[tokio::test]
    async fn test_post_table_body_is_json() {
        let fx = fixture_with(RecordingClient::responding(201, "{}"), "fn_http");
        fx.lua
            .load(r#"http.post("https://h.example/items", {name = "x"})"#)
            .exec_async()
            .await
            .unwrap();
        fx.lua
            .load(r#"http.request({method = "put", url = "https://h.example/raw", body = "plain"})"#)
            .exec_async()
            .await
            .unwrap();

        let sent = fx.client.sent();
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"x"}"#));
        assert_eq!(sent[0].headers["Content-Type"], "application/json");
        assert_eq!(sent[1].method, "PUT");
        assert_eq!(sent[1].body.as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn test_errors_use_two_value_form() {
        let fx = fixture();
        let (bad_scheme, refused): (String, String) = fx
            .lua
            .load(
                r#"
                local _, e1 = http.get("file:///etc/passwd")
                local _, e2 = http.delete("https://down.example")
                return e1, e2
                "#,
            )
            .eval_async()
            .await
            .unwrap();

        assert!(bad_scheme.contains("unsupported url scheme"));
        assert_eq!(refused, "HTTP request failed: connection refused");
        // The invalid request never reached the client
        assert_eq!(fx.client.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call_raises() {
        let fx = fixture_with(RecordingClient::responding(200, ""), "fn_http");
        fx.controller.cancel();

        let err = fx
            .lua
            .load(r#"http.get("https://h.example")"#)
            .exec_async()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("execution cancelled"));
        assert!(fx.client.sent().is_empty());
    }
}
