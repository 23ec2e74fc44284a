//! tests/provider_tests.rs
//! `ProviderClient` contra un servidor actix local que imita al proveedor.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use actix_web::dev::ServerHandle;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::config::app_config::ProviderConfig;
    use crate::models::outreach_model::AgentSelector;
    use crate::services::provider_client::{OutreachProvider, ProviderClient};

    #[derive(Clone, Copy)]
    enum Mode {
        Accept,
        Reject,
        MissingId,
        Slow,
    }

    struct Received {
        path: String,
        authorization: Option<String>,
        body: Value,
    }

    struct StubState {
        mode: Mode,
        received: Mutex<Vec<Received>>,
    }

    async fn provider_stub(
        req: HttpRequest,
        body: web::Json<Value>,
        state: web::Data<StubState>,
    ) -> HttpResponse {
        let path = req.path().to_string();
        state.received.lock().push(Received {
            path: path.clone(),
            authorization: req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: body.into_inner(),
        });

        match state.mode {
            Mode::Accept if path.ends_with("/make-call") => {
                HttpResponse::Ok().json(json!({"call_id": "call-123"}))
            }
            Mode::Accept => HttpResponse::Ok().json(json!({"id": "sms-77"})),
            Mode::Reject => HttpResponse::UnprocessableEntity().body("invalid to_number"),
            Mode::MissingId => HttpResponse::Ok().json(json!({"status": "queued"})),
            Mode::Slow => {
                actix_rt::time::sleep(Duration::from_secs(3)).await;
                HttpResponse::Ok().json(json!({"call_id": "too-late"}))
            }
        }
    }

    async fn start_stub(mode: Mode) -> (SocketAddr, ServerHandle, web::Data<StubState>) {
        let state = web::Data::new(StubState {
            mode,
            received: Mutex::new(Vec::new()),
        });
        let app_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(app_state.clone())
                .default_service(web::post().to(provider_stub))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("Failed to bind stub provider");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);
        (addr, handle, state)
    }

    fn client_for(addr: SocketAddr, timeout: Duration) -> ProviderClient {
        ProviderClient::new(&ProviderConfig {
            base_url: format!("http://{}/", addr),
            api_key: "test-key".to_string(),
            timeout,
        })
        .expect("Failed to build client")
    }

    #[actix_rt::test]
    async fn place_call_posts_payload_and_returns_call_id() {
        let (addr, handle, state) = start_stub(Mode::Accept).await;
        let client = client_for(addr, Duration::from_secs(5));

        let receipt = client
            .place_call(
                "+15551234567",
                "+15550009999",
                &AgentSelector::Agent("agent-1".to_string()),
                Some(&json!({"offer": "spring"})),
            )
            .await
            .unwrap();
        assert_eq!(receipt.provider_reference_id, "call-123");

        {
            let received = state.received.lock();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].path, "/voice/make-call");
            assert_eq!(received[0].authorization.as_deref(), Some("Bearer test-key"));
            assert_eq!(
                received[0].body,
                json!({
                    "to_number": "+15551234567",
                    "from_number": "+15550009999",
                    "agent_id": "agent-1",
                    "initialization_values": {"offer": "spring"}
                })
            );
        }
        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn send_text_accepts_plain_id_field() {
        let (addr, handle, state) = start_stub(Mode::Accept).await;
        let client = client_for(addr, Duration::from_secs(5));

        let receipt = client
            .send_text("+15551234567", "+15550009999", "Hola!", None, None)
            .await
            .unwrap();
        assert_eq!(receipt.provider_reference_id, "sms-77");

        {
            let received = state.received.lock();
            assert_eq!(received[0].path, "/sms/send-message");
            assert_eq!(received[0].body["message"], "Hola!");
            assert!(received[0].body.get("agent_id").is_none());
            assert!(received[0].body.get("agent_template_id").is_none());
        }
        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn non_2xx_keeps_status_and_body() {
        let (addr, handle, _state) = start_stub(Mode::Reject).await;
        let client = client_for(addr, Duration::from_secs(5));

        let err = client
            .place_call(
                "+15551234567",
                "+15550009999",
                &AgentSelector::Template("tpl".to_string()),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(422));
        assert_eq!(err.body.as_deref(), Some("invalid to_number"));
        assert_eq!(err.to_string(), "Provider API error: 422 - invalid to_number");
        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn success_without_reference_is_an_error() {
        let (addr, handle, _state) = start_stub(Mode::MissingId).await;
        let client = client_for(addr, Duration::from_secs(5));

        let err = client
            .send_text("+15551234567", "+15550009999", "hi", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(200));
        assert!(err.to_string().contains("message_id or id"));
        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn slow_provider_hits_the_timeout() {
        let (addr, handle, _state) = start_stub(Mode::Slow).await;
        let client = client_for(addr, Duration::from_millis(200));

        let err = client
            .place_call(
                "+15551234567",
                "+15550009999",
                &AgentSelector::Agent("agent-1".to_string()),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code, None);
        assert!(err.to_string().starts_with("Provider request failed"));
        handle.stop(false).await;
    }

    #[actix_rt::test]
    async fn unreachable_provider_is_a_transport_error() {
        // puerto cerrado: bind y soltar
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = client_for(addr, Duration::from_secs(2));

        let err = client
            .send_text("+15551234567", "+15550009999", "hi", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code, None);
        assert!(err.body.is_none());
    }
}
