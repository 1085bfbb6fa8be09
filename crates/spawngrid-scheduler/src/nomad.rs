//! Nomad HTTP API client.

use async_trait::async_trait;
use tracing::{debug, info};

use spawngrid_core::{SchedulerSettings, ServiceEndpoint};
use spawngrid_registry::{RegistryClient, ServiceInstance};
use spawngrid_transport::{ApiClient, RemoteError, RemoteResult};

use crate::client::SchedulerClient;
use crate::jobspec::JobSpec;
use crate::models::*;

/// Header carrying the Nomad ACL token.
pub const TOKEN_HEADER: &str = "x-nomad-token";

/// Error bodies Nomad returns when a CSI volume already exists.
const VOLUME_EXISTS_MARKERS: [&str; 2] = [
    "ErrorCode: \"AccessPointAlreadyExists\"",
    "volume external ID cannot be updated",
];

/// Scheduler client for a Nomad cluster.
#[derive(Clone)]
pub struct NomadClient {
    api: ApiClient,
}

impl NomadClient {
    /// Wrap an `ApiClient` already configured with namespace and token.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> RemoteResult<Self> {
        let api = ApiClient::new(&settings.address, &settings.tls)?
            .with_namespace(settings.namespace.clone())
            .with_token(TOKEN_HEADER, settings.token.as_deref())?;
        Ok(Self::new(api))
    }

    async fn service_registrations(&self, service: &str) -> RemoteResult<Vec<ServiceRegistration>> {
        self.api
            .get_json(&format!("/v1/service/{service}"), &[])
            .await
    }
}

fn is_volume_exists(err: &RemoteError) -> bool {
    err.body()
        .is_some_and(|body| VOLUME_EXISTS_MARKERS.iter().any(|m| body.contains(m)))
}

fn string_field(job: &serde_json::Value, field: &str) -> Option<String> {
    job.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SchedulerClient for NomadClient {
    async fn create_volume(&self, volume_id: &str, plugin_id: &str) -> RemoteResult<()> {
        let path = format!("/v1/volume/csi/{volume_id}/create");
        let body = CsiVolumeCreateRequest::single(volume_id, plugin_id);
        match self.api.put(&path, &[], &body).await {
            Ok(response) => {
                info!(%volume_id, %plugin_id, status = response.status, "created volume");
                Ok(())
            }
            Err(e) if is_volume_exists(&e) => {
                info!(%volume_id, %plugin_id, "volume already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_volume(&self, volume_id: &str) -> RemoteResult<()> {
        let path = format!("/v1/volume/csi/{volume_id}/delete");
        self.api.post::<()>(&path, &[], None).await?;
        info!(%volume_id, "deleted volume");
        Ok(())
    }

    async fn submit_job(&self, spec: &JobSpec) -> RemoteResult<SubmittedJob> {
        let parse = JobsParseRequest {
            job_hcl: &spec.hcl,
            canonicalize: true,
        };
        let parsed: serde_json::Value = self
            .api
            .post("/v1/jobs/parse", &[], Some(&parse))
            .await?
            .json("/v1/jobs/parse")?;

        let job_id = string_field(&parsed, "ID").ok_or_else(|| RemoteError::Decode {
            path: "/v1/jobs/parse".to_string(),
            reason: "parsed job has no ID".to_string(),
        })?;
        let job_name = string_field(&parsed, "Name").unwrap_or_else(|| job_id.clone());
        debug!(%job_id, "job parsed");

        self.api
            .post("/v1/jobs", &[], Some(&JobRegisterRequest::new(parsed)))
            .await?;
        info!(%job_id, %job_name, "job registered");

        Ok(SubmittedJob { job_id, job_name })
    }

    async fn job_status(&self, job_id: &str) -> RemoteResult<JobDocument> {
        self.api.get_json(&format!("/v1/job/{job_id}"), &[]).await
    }

    async fn list_allocations(&self, job_id: &str) -> RemoteResult<Vec<Allocation>> {
        self.api
            .get_json(&format!("/v1/job/{job_id}/allocations"), &[])
            .await
    }

    async fn delete_job(&self, job_id: &str, purge: bool) -> RemoteResult<()> {
        let query: &[(&str, &str)] = if purge { &[("purge", "true")] } else { &[] };
        self.api.delete(&format!("/v1/job/{job_id}"), query).await?;
        info!(%job_id, purge, "job deleted");
        Ok(())
    }

    async fn resolve_service_address(&self, service: &str) -> RemoteResult<ServiceEndpoint> {
        let mut registrations = self.service_registrations(service).await?;
        match registrations.len() {
            0 => Err(RemoteError::Lookup(format!("service {service} not found"))),
            1 => {
                let r = registrations.remove(0);
                Ok(ServiceEndpoint {
                    address: r.address,
                    port: r.port,
                })
            }
            n => Err(RemoteError::Lookup(format!(
                "{n} registrations found for service {service}"
            ))),
        }
    }

    async fn allocation_address(&self, allocation_id: &str) -> RemoteResult<ServiceEndpoint> {
        let path = format!("/v1/allocation/{allocation_id}");
        let detail: AllocationDetail = self.api.get_json(&path, &[]).await?;
        let network = detail
            .resources
            .networks
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Lookup(format!("allocation {allocation_id} has no network")))?;
        let port = network
            .dynamic_ports
            .as_deref()
            .and_then(|ports| ports.first())
            .ok_or_else(|| {
                RemoteError::Lookup(format!("allocation {allocation_id} has no dynamic port"))
            })?;
        Ok(ServiceEndpoint {
            address: network.ip,
            port: port.value,
        })
    }
}

/// Nomad's native service catalog as a registry.
#[async_trait]
impl RegistryClient for NomadClient {
    async fn healthy_instances(&self, service: &str) -> RemoteResult<Vec<ServiceInstance>> {
        let registrations = self.service_registrations(service).await?;
        debug!(%service, count = registrations.len(), "nomad service registrations");
        Ok(registrations
            .into_iter()
            .map(|r| ServiceInstance {
                address: r.address,
                port: r.port,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawngrid_core::{JobStatus, TlsSettings};
    use spawngrid_transport::stub::{StubResponse, StubServer};

    async fn nomad(routes: Vec<StubResponse>) -> (StubServer, NomadClient) {
        let server = StubServer::start(routes).await.unwrap();
        let settings = SchedulerSettings {
            address: server.url(),
            token: Some("nomad-secret".to_string()),
            namespace: "notebooks".to_string(),
            tls: TlsSettings::default(),
        };
        let client = NomadClient::from_settings(&settings).unwrap();
        (server, client)
    }

    fn spec() -> JobSpec {
        JobSpec {
            job_id: "spawngrid-abc".to_string(),
            hcl: "job \"spawngrid-abc\" {}".to_string(),
        }
    }

    #[tokio::test]
    async fn create_volume_sends_csi_request() {
        let (server, client) = nomad(vec![StubResponse::json(
            "PUT",
            "/v1/volume/csi/notebook-abc/create",
            200,
            "{}",
        )])
        .await;

        client.create_volume("notebook-abc", "plugin-x").await.unwrap();

        let requests = server.requests();
        assert_eq!(
            requests[0].path_and_query,
            "/v1/volume/csi/notebook-abc/create?namespace=notebooks"
        );
        assert_eq!(requests[0].header(TOKEN_HEADER).as_deref(), Some("nomad-secret"));
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["Volumes"][0]["PluginID"], "plugin-x");
    }

    #[tokio::test]
    async fn create_volume_twice_is_idempotent() {
        let (_server, client) = nomad(vec![
            StubResponse::json("PUT", "/v1/volume/csi/notebook-abc/create", 200, "{}").times(1),
            StubResponse::json(
                "PUT",
                "/v1/volume/csi/notebook-abc/create",
                500,
                "rpc error: controller create volume: CSI.ControllerCreateVolume: ErrorCode: \"AccessPointAlreadyExists\"",
            ),
        ])
        .await;

        client.create_volume("notebook-abc", "plugin-x").await.unwrap();
        client.create_volume("notebook-abc", "plugin-x").await.unwrap();
    }

    #[tokio::test]
    async fn create_volume_external_id_conflict_is_success() {
        let (_server, client) = nomad(vec![StubResponse::json(
            "PUT",
            "/v1/volume/csi/notebook-abc/create",
            400,
            "volume external ID cannot be updated",
        )])
        .await;
        assert!(client.create_volume("notebook-abc", "plugin-x").await.is_ok());
    }

    #[tokio::test]
    async fn create_volume_other_error_fails() {
        let (_server, client) = nomad(vec![StubResponse::json(
            "PUT",
            "/v1/volume/csi/notebook-abc/create",
            500,
            "plugin unavailable",
        )])
        .await;
        let err = client
            .create_volume("notebook-abc", "plugin-x")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn submit_parses_then_registers() {
        let parsed = r#"{"ID":"spawngrid-abc","Name":"spawngrid-abc-name","Type":"service"}"#;
        let (server, client) = nomad(vec![
            StubResponse::json("POST", "/v1/jobs/parse", 200, parsed),
            StubResponse::json("POST", "/v1/jobs", 200, r#"{"EvalID":"e1"}"#),
        ])
        .await;

        let job = client.submit_job(&spec()).await.unwrap();
        assert_eq!(
            job,
            SubmittedJob {
                job_id: "spawngrid-abc".to_string(),
                job_name: "spawngrid-abc-name".to_string(),
            }
        );

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path(), "/v1/jobs/parse");
        let parse: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(parse["JobHCL"], "job \"spawngrid-abc\" {}");
        assert_eq!(parse["Canonicalize"], true);

        assert_eq!(requests[1].path_and_query, "/v1/jobs?namespace=notebooks");
        let register: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(register["Job"]["ID"], "spawngrid-abc");
        assert_eq!(register["PreserveCounts"], true);
    }

    #[tokio::test]
    async fn submit_parse_failure_does_not_register() {
        let (server, client) = nomad(vec![StubResponse::json(
            "POST",
            "/v1/jobs/parse",
            400,
            "error parsing: bad HCL",
        )])
        .await;

        let err = client.submit_job(&spec()).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(server.requests_to("POST", "/v1/jobs").is_empty());
    }

    #[tokio::test]
    async fn job_name_defaults_to_id() {
        let (_server, client) = nomad(vec![
            StubResponse::json("POST", "/v1/jobs/parse", 200, r#"{"ID":"spawngrid-abc"}"#),
            StubResponse::json("POST", "/v1/jobs", 200, "{}"),
        ])
        .await;
        let job = client.submit_job(&spec()).await.unwrap();
        assert_eq!(job.job_name, "spawngrid-abc");
    }

    #[tokio::test]
    async fn current_status_from_allocations() {
        let allocs = r#"[
            {"ID":"old","CreateTime":1,"TaskStates":{"notebook":{"State":"dead","Failed":true}}},
            {"ID":"new","CreateTime":2,"TaskStates":{"notebook":{"State":"pending","Failed":false,"Events":[{"Type":"Driver"}]}}}
        ]"#;
        let (_server, client) = nomad(vec![
            StubResponse::json(
                "GET",
                "/v1/job/spawngrid-abc",
                200,
                r#"{"ID":"spawngrid-abc","Name":"spawngrid-abc","Status":"pending"}"#,
            ),
            StubResponse::json("GET", "/v1/job/spawngrid-abc/allocations", 200, allocs),
        ])
        .await;

        assert_eq!(
            client.current_status("spawngrid-abc").await.unwrap(),
            JobStatus::Starting
        );
    }

    #[tokio::test]
    async fn dead_job_document_overrides_allocations() {
        let (server, client) = nomad(vec![StubResponse::json(
            "GET",
            "/v1/job/spawngrid-abc",
            200,
            r#"{"ID":"spawngrid-abc","Status":"dead"}"#,
        )])
        .await;

        assert_eq!(
            client.current_status("spawngrid-abc").await.unwrap(),
            JobStatus::Dead
        );
        assert!(
            server
                .requests_to("GET", "/v1/job/spawngrid-abc/allocations")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_job_with_purge() {
        let (server, client) = nomad(vec![StubResponse::json(
            "DELETE",
            "/v1/job/spawngrid-abc",
            200,
            "{}",
        )])
        .await;

        client.delete_job("spawngrid-abc", true).await.unwrap();
        client.delete_job("spawngrid-abc", false).await.unwrap();

        let requests = server.requests();
        assert_eq!(
            requests[0].path_and_query,
            "/v1/job/spawngrid-abc?namespace=notebooks&purge=true"
        );
        assert_eq!(
            requests[1].path_and_query,
            "/v1/job/spawngrid-abc?namespace=notebooks"
        );
    }

    #[tokio::test]
    async fn delete_volume_posts() {
        let (server, client) = nomad(vec![StubResponse::json(
            "POST",
            "/v1/volume/csi/notebook-abc/delete",
            200,
            "",
        )])
        .await;
        client.delete_volume("notebook-abc").await.unwrap();
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn resolve_service_address_requires_exactly_one() {
        let one = r#"[{"Address":"10.0.0.7","Port":23456}]"#;
        let two = r#"[{"Address":"10.0.0.7","Port":1},{"Address":"10.0.0.8","Port":2}]"#;
        let (_server, client) = nomad(vec![
            StubResponse::json("GET", "/v1/service/one", 200, one),
            StubResponse::json("GET", "/v1/service/two", 200, two),
            StubResponse::json("GET", "/v1/service/none", 200, "[]"),
        ])
        .await;

        let endpoint = client.resolve_service_address("one").await.unwrap();
        assert_eq!(endpoint.to_string(), "10.0.0.7:23456");
        assert!(matches!(
            client.resolve_service_address("two").await,
            Err(RemoteError::Lookup(_))
        ));
        assert!(matches!(
            client.resolve_service_address("none").await,
            Err(RemoteError::Lookup(_))
        ));
    }

    #[tokio::test]
    async fn allocation_address_uses_first_dynamic_port() {
        let body = r#"{"Resources":{"Networks":[{"IP":"10.0.0.9","DynamicPorts":[{"Label":"notebook","Value":27001}]}]}}"#;
        let (_server, client) = nomad(vec![StubResponse::json(
            "GET",
            "/v1/allocation/a1",
            200,
            body,
        )])
        .await;
        let endpoint = client.allocation_address("a1").await.unwrap();
        assert_eq!(endpoint.address, "10.0.0.9");
        assert_eq!(endpoint.port, 27001);
    }

    #[tokio::test]
    async fn allocation_without_networks_is_a_lookup_error() {
        let (_server, client) = nomad(vec![
            StubResponse::json(
                "GET",
                "/v1/allocation/a1",
                200,
                r#"{"Resources":{"Networks":null}}"#,
            ),
            StubResponse::json(
                "GET",
                "/v1/allocation/a2",
                200,
                r#"{"Resources":{"Networks":[{"IP":"10.0.0.9","DynamicPorts":null}]}}"#,
            ),
        ])
        .await;

        let err = client.allocation_address("a1").await.unwrap_err();
        assert!(matches!(&err, RemoteError::Lookup(m) if m.contains("no network")), "{err}");

        let err = client.allocation_address("a2").await.unwrap_err();
        assert!(matches!(&err, RemoteError::Lookup(m) if m.contains("no dynamic port")), "{err}");
    }

    #[tokio::test]
    async fn native_catalog_as_registry() {
        let body = r#"[{"Address":"10.0.0.7","Port":23456}]"#;
        let (_server, client) = nomad(vec![StubResponse::json(
            "GET",
            "/v1/service/spawngrid-abc-notebook",
            200,
            body,
        )])
        .await;
        let instances = client
            .healthy_instances("spawngrid-abc-notebook")
            .await
            .unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].port, 23456);
    }
}
