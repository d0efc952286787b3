use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Serialize;

use crate::management::{AlertingRuleId, Controller, RelabelConfigId};
use crate::resources::{RelabelConfig, Rule};
use crate::Error;

const RULE_PATH: &str = "/rules/namespaces/{namespace}/prometheusrules/{prometheusRule}/rules/{ruleName}/severities/{severity}";
const RELABEL_CONFIG_PATH: &str = "/relabelconfigs/namespaces/{namespace}/alertrelabelconfigs/{name}";

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidIdentity(_) | Error::InvalidRule(_) => StatusCode::BAD_REQUEST,
            Error::DocumentNotFound { .. }
            | Error::RuleNotFound(_)
            | Error::RelabelConfigNotFound { .. } => StatusCode::NOT_FOUND,
            Error::OwnershipConflict { .. } | Error::ConcurrentModification { .. } => {
                StatusCode::CONFLICT
            }
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.metric_label(),
            message: self.to_string(),
        })
    }
}

/// Mount the management API under `/api/v1/alerting`.
///
/// Expects the [`Controller`] as `web::Data` in the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/alerting")
            .service(web::resource("/rules").route(web::get().to(list_alerting_rules)))
            .service(
                web::resource(RULE_PATH)
                    .route(web::get().to(get_alerting_rule))
                    .route(web::post().to(create_alerting_rule))
                    .route(web::put().to(update_alerting_rule))
                    .route(web::patch().to(update_alerting_rule))
                    .route(web::delete().to(delete_alerting_rule)),
            )
            .service(web::resource("/relabelconfigs").route(web::get().to(list_relabel_configs)))
            .service(
                web::resource(RELABEL_CONFIG_PATH)
                    .route(web::get().to(get_relabel_configs))
                    .route(web::post().to(create_relabel_config))
                    .route(web::put().to(update_relabel_configs))
                    .route(web::delete().to(delete_relabel_config)),
            ),
    );
}

async fn list_alerting_rules(c: web::Data<Controller>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(c.list_alerting_rules().await?))
}

async fn get_alerting_rule(
    c: web::Data<Controller>,
    id: web::Path<AlertingRuleId>,
) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(c.get_alerting_rule(&id).await?))
}

async fn create_alerting_rule(
    c: web::Data<Controller>,
    id: web::Path<AlertingRuleId>,
    rule: web::Json<Rule>,
) -> Result<HttpResponse, Error> {
    let rule = c.create_alerting_rule(&id, rule.into_inner()).await?;
    Ok(HttpResponse::Created().json(rule))
}

async fn update_alerting_rule(
    c: web::Data<Controller>,
    id: web::Path<AlertingRuleId>,
    rule: web::Json<Rule>,
) -> Result<HttpResponse, Error> {
    let rule = c.update_alerting_rule(&id, rule.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rule))
}

async fn delete_alerting_rule(
    c: web::Data<Controller>,
    id: web::Path<AlertingRuleId>,
) -> Result<HttpResponse, Error> {
    c.delete_alerting_rule(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_relabel_configs(c: web::Data<Controller>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(c.list_relabel_configs().await?))
}

async fn get_relabel_configs(
    c: web::Data<Controller>,
    id: web::Path<RelabelConfigId>,
) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(c.get_relabel_configs(&id).await?))
}

async fn create_relabel_config(
    c: web::Data<Controller>,
    id: web::Path<RelabelConfigId>,
    entry: web::Json<RelabelConfig>,
) -> Result<HttpResponse, Error> {
    let entry = c.create_relabel_config(&id, entry.into_inner()).await?;
    Ok(HttpResponse::Created().json(entry))
}

async fn update_relabel_configs(
    c: web::Data<Controller>,
    id: web::Path<RelabelConfigId>,
    entries: web::Json<Vec<RelabelConfig>>,
) -> Result<HttpResponse, Error> {
    let entries = c.update_relabel_configs(&id, entries.into_inner()).await?;
    Ok(HttpResponse::Ok().json(entries))
}

async fn delete_relabel_config(
    c: web::Data<Controller>,
    id: web::Path<RelabelConfigId>,
    entry: web::Json<RelabelConfig>,
) -> Result<HttpResponse, Error> {
    c.delete_relabel_config(&id, entry.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actix_web::{test, App};
    use assert_json_diff::assert_json_include;
    use serde_json::{json, Value};

    use super::*;
    use crate::management::testing::harness;
    use crate::resources::{PrometheusRule, PrometheusRuleSpec, RuleGroup};
    use crate::store::StoreError;

    const HIGH_MEMORY: &str =
        "/api/v1/alerting/rules/namespaces/ns/prometheusrules/pr1/rules/HighMemory/severities/critical";

    fn high_memory() -> Value {
        json!({
            "alert": "HighMemory",
            "expr": "node_memory_usage > 0.9",
            "for": "5m",
            "labels": {"severity": "critical"}
        })
    }

    #[actix_web::test]
    async fn rule_lifecycle_over_http() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(h.controller.clone()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(HIGH_MEMORY)
                .set_json(high_memory())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = test::call_service(&app, test::TestRequest::get().uri(HIGH_MEMORY).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_json_include!(actual: body, expected: high_memory());

        let listed: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/alerting/rules")
                .to_request(),
        )
        .await;
        assert_json_include!(
            actual: listed,
            expected: json!([{
                "id": {
                    "namespace": "ns",
                    "prometheusRule": "pr1",
                    "ruleName": "HighMemory",
                    "severity": "critical"
                },
                "managed": true
            }])
        );

        let resp = test::call_service(&app, test::TestRequest::delete().uri(HIGH_MEMORY).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = test::call_service(&app, test::TestRequest::get().uri(HIGH_MEMORY).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "DocumentNotFound");
    }

    #[actix_web::test]
    async fn foreign_documents_are_a_conflict() {
        let h = harness();
        let mut foreign = PrometheusRule::new(
            "pr1",
            PrometheusRuleSpec {
                groups: vec![RuleGroup {
                    name: "team".into(),
                    ..Default::default()
                }],
            },
        );
        foreign.metadata.namespace = Some("ns".into());
        h.rules.insert(foreign);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(h.controller.clone()))
                .configure(configure),
        )
        .await;

        for request in [
            test::TestRequest::post().set_json(high_memory()),
            test::TestRequest::patch().set_json(high_memory()),
        ] {
            let resp = test::call_service(&app, request.uri(HIGH_MEMORY).to_request()).await;
            assert_eq!(resp.status(), StatusCode::CONFLICT);
        }
        assert_eq!(h.rules.writes(), 0);
    }

    #[actix_web::test]
    async fn mismatched_payload_is_a_bad_request() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(h.controller.clone()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/alerting/rules/namespaces/ns/prometheusrules/pr1/rules/HighMemory/severities/warning")
                .set_json(high_memory())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "InvalidRule");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/v1/alerting/rules/namespaces/ns/prometheusrules/pr1/rules/HighMemory/severities/%20")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn relabel_configs_over_http() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(h.controller.clone()))
                .configure(configure),
        )
        .await;
        let path = "/api/v1/alerting/relabelconfigs/namespaces/openshift-monitoring/alertrelabelconfigs/watchdog";
        let entry = json!({"sourceLabels": ["alertname"], "regex": "Watchdog", "action": "Drop"});

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri(path).set_json(&entry).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let configs: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(configs, json!([entry]));

        let resp = test::call_service(
            &app,
            test::TestRequest::delete().uri(path).set_json(&entry).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn error_kinds_map_to_distinct_statuses() {
        let upstream = Error::Upstream {
            operation: "get",
            resource: "PrometheusRule ns/pr1".into(),
            source: StoreError::Conflict("stale".into()),
        };
        let deadline = Error::DeadlineExceeded {
            operation: "get",
            resource: "PrometheusRule ns/pr1".into(),
            timeout: Duration::from_secs(30),
        };
        let retries = Error::ConcurrentModification {
            resource: "PrometheusRule ns/pr1".into(),
            attempts: 4,
        };

        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(deadline.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(retries.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            Error::InvalidQueryResult("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
