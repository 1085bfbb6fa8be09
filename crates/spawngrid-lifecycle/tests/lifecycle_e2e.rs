//! End-to-end lifecycle runs against loopback scheduler and registry
//! servers, using the real HTTP clients.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use spawngrid_core::{
    RegistrySettings, Resources, SchedulerSettings, VolumeRequest, WorkloadParams,
    derive_workload_id, job_id_for, service_name_for, volume_id_for,
};
use spawngrid_lifecycle::{
    LifecycleOrchestrator, LifecyclePhase, PollOutcome, PollPolicy, ResolvePolicy,
};
use spawngrid_registry::ConsulRegistry;
use spawngrid_scheduler::NomadClient;
use spawngrid_state::{SessionRecord, SessionStore};
use spawngrid_transport::stub::{StubResponse, StubServer};

const PENDING_ALLOC: &str = r#"[{"ID":"a1","CreateTime":1,"TaskStates":{"notebook":{"State":"pending","Failed":false,"Events":[{"Type":"Received"}]}}}]"#;
const STARTING_ALLOC: &str = r#"[{"ID":"a1","CreateTime":1,"TaskStates":{"notebook":{"State":"pending","Failed":false,"Events":[{"Type":"Received"},{"Type":"Driver"}]}}}]"#;
const RUNNING_ALLOC: &str = r#"[{"ID":"a1","CreateTime":1,"TaskStates":{"notebook":{"State":"running","Failed":false,"Events":[{"Type":"Started"}]}}}]"#;

struct Names {
    workload_id: String,
    job_id: String,
    service: String,
}

fn names() -> Names {
    let workload_id = derive_workload_id("alice:");
    let job_id = job_id_for(&workload_id);
    let service = service_name_for(&job_id);
    Names {
        workload_id,
        job_id,
        service,
    }
}

fn params(volume: VolumeRequest) -> WorkloadParams {
    WorkloadParams {
        tenant: "alice".to_string(),
        session: String::new(),
        image: "org/image:tag".to_string(),
        resources: Resources {
            memory_mb: 512,
            cpu_mhz: None,
        },
        datacenters: vec!["dc1".to_string()],
        volume,
        env: BTreeMap::new(),
        args: Vec::new(),
    }
}

/// Scheduler routes for a job that goes pending → starting → running.
fn scheduler_routes(job_id: &str) -> Vec<StubResponse> {
    let job = format!(r#"{{"ID":"{job_id}","Name":"{job_id}","Status":"pending"}}"#);
    let allocations = format!("/v1/job/{job_id}/allocations");
    vec![
        StubResponse::json("POST", "/v1/jobs/parse", 200, job.clone()),
        StubResponse::json("POST", "/v1/jobs", 200, r#"{"EvalID":"e1"}"#),
        StubResponse::json("GET", &format!("/v1/job/{job_id}"), 200, job),
        StubResponse::json("GET", &allocations, 200, PENDING_ALLOC).times(1),
        StubResponse::json("GET", &allocations, 200, STARTING_ALLOC).times(1),
        StubResponse::json("GET", &allocations, 200, RUNNING_ALLOC),
        StubResponse::json("DELETE", &format!("/v1/job/{job_id}"), 200, "{}"),
    ]
}

fn consul_routes(service: &str) -> Vec<StubResponse> {
    vec![StubResponse::json(
        "GET",
        &format!("/v1/health/service/{service}"),
        200,
        r#"[{"Node":{"Address":"10.0.0.5"},"Service":{"Address":"10.1.2.3","Port":25123}}]"#,
    )]
}

fn nomad(server: &StubServer) -> Arc<NomadClient> {
    let settings = SchedulerSettings {
        address: server.url(),
        ..Default::default()
    };
    Arc::new(NomadClient::from_settings(&settings).unwrap())
}

fn consul(server: &StubServer) -> Arc<ConsulRegistry> {
    let settings = RegistrySettings {
        address: server.url(),
        ..Default::default()
    };
    Arc::new(ConsulRegistry::from_settings(&settings).unwrap())
}

fn fast(orch: LifecycleOrchestrator) -> LifecycleOrchestrator {
    orch.with_poll_policy(PollPolicy {
        interval: Duration::from_millis(20),
        max_wait: Some(Duration::from_secs(10)),
    })
    .with_resolve_policy(ResolvePolicy {
        delay: Duration::from_millis(20),
        max_attempts: 5,
    })
}

#[tokio::test]
async fn start_without_volume_runs_and_persists_identity() {
    let n = names();
    let scheduler = StubServer::start(scheduler_routes(&n.job_id)).await.unwrap();
    let registry = StubServer::start(consul_routes(&n.service)).await.unwrap();

    let mut orch = fast(LifecycleOrchestrator::new(nomad(&scheduler), consul(&registry)));
    let endpoint = orch.start(&params(VolumeRequest::None)).await.unwrap();

    assert_eq!(endpoint.to_string(), "10.1.2.3:25123");
    assert_eq!(orch.phase(), LifecyclePhase::Running);

    // One parse + one register, no volume traffic.
    assert_eq!(scheduler.requests_to("POST", "/v1/jobs").len(), 1);
    let parse = scheduler.requests_to("POST", "/v1/jobs/parse");
    assert_eq!(parse.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&parse[0].body).unwrap();
    let hcl = body["JobHCL"].as_str().unwrap();
    assert!(!hcl.contains("volume"));
    assert!(hcl.contains("\"org/image:tag\""));
    assert!(scheduler.requests().iter().all(|r| r.method != "PUT"));

    // pending → starting → running.
    let allocations = format!("/v1/job/{}/allocations", n.job_id);
    assert_eq!(scheduler.requests_to("GET", &allocations).len(), 3);
    assert_eq!(
        registry
            .requests_to("GET", &format!("/v1/health/service/{}", n.service))
            .len(),
        1
    );

    // Persist, reload into a fresh orchestrator, poll and stop.
    let store = SessionStore::open_in_memory().unwrap();
    let mut record = SessionRecord::new("alice", "");
    record.identity = orch.identity().cloned();
    record.phase = orch.phase().to_string();
    store.put_session(&record).unwrap();

    let stored = store.get_session("alice", "").unwrap().unwrap();
    let identity = stored.identity.unwrap();
    assert_eq!(identity.workload_id, n.workload_id);
    assert_eq!(identity.job_id, n.job_id);
    assert_eq!(identity.service_name, n.service);

    let mut revived = fast(LifecycleOrchestrator::new(nomad(&scheduler), consul(&registry)));
    revived.resume(identity, stored.volume_id).unwrap();
    assert_eq!(revived.poll().await, PollOutcome::Healthy);

    let outcome = revived.stop().await;
    assert!(outcome.remote_error.is_none());
    assert!(revived.identity().is_none());
    assert_eq!(
        scheduler
            .requests_to("DELETE", &format!("/v1/job/{}", n.job_id))
            .len(),
        1
    );
}

#[tokio::test]
async fn csi_volume_created_before_submit() {
    let n = names();
    let volume_id = volume_id_for(&n.workload_id);
    let mut routes = vec![StubResponse::json(
        "PUT",
        &format!("/v1/volume/csi/{volume_id}/create"),
        200,
        "{}",
    )];
    routes.extend(scheduler_routes(&n.job_id));
    let scheduler = StubServer::start(routes).await.unwrap();
    let registry = StubServer::start(consul_routes(&n.service)).await.unwrap();

    let mut orch = fast(LifecycleOrchestrator::new(nomad(&scheduler), consul(&registry)));
    orch.start(&params(VolumeRequest::DynamicProvisioned {
        destination_path: "/home/jovyan/work".to_string(),
        plugin_id: "plugin-x".to_string(),
    }))
    .await
    .unwrap();

    let requests = scheduler.requests();
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].path(), format!("/v1/volume/csi/{volume_id}/create"));
    let create: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(create["Volumes"][0]["PluginID"], "plugin-x");

    assert_eq!(requests[1].path(), "/v1/jobs/parse");
    let parse: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert!(
        parse["JobHCL"]
            .as_str()
            .unwrap()
            .contains(&format!("source    = \"{volume_id}\""))
    );
    assert_eq!(orch.volume_id(), Some(volume_id.as_str()));
}

#[tokio::test]
async fn native_catalog_resolves_endpoint() {
    let n = names();
    let mut routes = scheduler_routes(&n.job_id);
    routes.push(StubResponse::json(
        "GET",
        &format!("/v1/service/{}", n.service),
        200,
        r#"[{"Address":"10.0.0.7","Port":23456}]"#,
    ));
    let scheduler = StubServer::start(routes).await.unwrap();

    let client = nomad(&scheduler);
    let mut orch = fast(LifecycleOrchestrator::new(client.clone(), client));
    let endpoint = orch.start(&params(VolumeRequest::None)).await.unwrap();
    assert_eq!(endpoint.to_string(), "10.0.0.7:23456");
}

#[tokio::test]
async fn dead_job_fails_and_stop_still_deletes() {
    let n = names();
    let job = format!(r#"{{"ID":"{}","Name":"{}","Status":"dead"}}"#, n.job_id, n.job_id);
    let scheduler = StubServer::start(vec![
        StubResponse::json("POST", "/v1/jobs/parse", 200, job.clone()),
        StubResponse::json("POST", "/v1/jobs", 200, "{}"),
        StubResponse::json("GET", &format!("/v1/job/{}", n.job_id), 200, job),
        StubResponse::json("DELETE", &format!("/v1/job/{}", n.job_id), 500, "no leader"),
    ])
    .await
    .unwrap();
    let registry = StubServer::start(consul_routes(&n.service)).await.unwrap();

    let mut orch = fast(LifecycleOrchestrator::new(nomad(&scheduler), consul(&registry)));
    let err = orch.start(&params(VolumeRequest::None)).await.unwrap_err();
    assert!(err.to_string().contains("is dead"));
    assert!(registry.requests().is_empty());

    let outcome = orch.stop().await;
    assert!(outcome.remote_error.unwrap().contains("500"));
    assert!(orch.identity().is_none());
    assert_eq!(orch.phase(), LifecyclePhase::Stopped);
}
