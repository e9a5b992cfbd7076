use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::client::types::{JobDetails, ProjectSlug, Step};
use crate::client::{CircleCiClients, StepOutputApi};
use crate::error::{CciError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshDetails {
    pub job_number: u64,
    pub job_name: String,
    pub command: String,
}

/// Pulls the connection command out of an "Enable SSH" step's output.
///
/// Looks for a `$ ssh ...` prompt line first, then a bare `ssh -p <port> <ip>`.
/// Falls back to the whole output, trimmed.
pub fn extract_ssh_command(output: &str) -> String {
    let prompt = Regex::new(r"\$\s*(ssh\s+[^\n]+)").ok();
    if let Some(found) = prompt.and_then(|re| re.captures(output)).and_then(|c| c.get(1)) {
        return found.as_str().trim().to_string();
    }

    let bare = Regex::new(r"ssh\s+-p\s+\d+\s+[\d.]+").ok();
    if let Some(found) = bare.and_then(|re| re.find(output)) {
        return found.as_str().trim().to_string();
    }

    output.trim().to_string()
}

fn ssh_step(details: &JobDetails) -> Option<&Step> {
    details
        .steps
        .iter()
        .find(|step| step.name.to_lowercase().contains("enable ssh") && !step.actions.is_empty())
}

/// SSH connection details for a job rerun with SSH enabled.
///
/// With `job_number` the job must belong to the workflow. Without it, the last
/// job that already has an "Enable SSH" step is used; jobs whose details are
/// not available yet are skipped. `Ok(None)` means no such step exists yet,
/// which is normal for a few seconds after a rerun.
///
/// # Errors
///
/// [`CciError::NotFound`] when `job_number` is not part of the workflow, plus
/// transport errors.
pub async fn get_ssh_details(
    clients: &CircleCiClients,
    step_output: &StepOutputApi,
    workflow_id: &str,
    job_number: Option<u64>,
) -> Result<Option<SshDetails>> {
    let workflow = clients.workflows.get_workflow(workflow_id).await?;
    let slug = &workflow.project_slug;
    let jobs = clients.jobs.get_workflow_jobs(workflow_id, None).await?;

    let details = match job_number {
        Some(number) => {
            if !jobs.iter().any(|job| job.job_number == Some(number)) {
                return Err(CciError::NotFound(format!("Job {number} in workflow {workflow_id}")));
            }
            clients.job_details.get_job_details(slug, number).await?
        }
        None => match last_ssh_job(clients, slug, jobs.iter().rev().filter_map(|j| j.job_number)).await {
            Some(details) => details,
            None => return Ok(None),
        },
    };

    let Some(action) = ssh_step(&details).and_then(|step| step.actions.first()) else {
        return Ok(None);
    };
    let output = step_output
        .get_step_output(slug, details.build_num, action.index, action.step)
        .await?;

    Ok(Some(SshDetails {
        job_number: details.build_num,
        job_name: details.workflows.job_name.clone(),
        command: extract_ssh_command(&output.output),
    }))
}

async fn last_ssh_job(
    clients: &CircleCiClients,
    slug: &ProjectSlug,
    newest_first: impl Iterator<Item = u64>,
) -> Option<JobDetails> {
    for number in newest_first {
        match clients.job_details.get_job_details(slug, number).await {
            Ok(details) if ssh_step(&details).is_some() => return Some(details),
            Ok(_) => {}
            Err(e) => debug!("Job {number} not ready: {e}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::client::{ClientConfig, PrivateClients, RateLimitConfig};
    use serde_json::json;

    mod extract_ssh_command {
        use super::*;

        #[test]
        fn prefers_prompt_line() {
            let output = "You can now SSH into this box.\n    $ ssh -p 54782 52.90.1.2\n\nbye";
            assert_eq!(extract_ssh_command(output), "ssh -p 54782 52.90.1.2");
        }

        #[test]
        fn falls_back_to_bare_command() {
            let output = "connect with ssh -p 64535 10.0.0.1 now";
            assert_eq!(extract_ssh_command(output), "ssh -p 64535 10.0.0.1");
        }

        #[test]
        fn otherwise_returns_trimmed_output() {
            assert_eq!(extract_ssh_command("  waiting for host \n"), "waiting for host");
        }
    }

    fn setup(server: &mockito::Server) -> (CircleCiClients, PrivateClients) {
        let config = ClientConfig::new(Token::from("t"))
            .unwrap()
            .with_base_url(&server.url())
            .unwrap()
            .with_step_output_rate_limit(RateLimitConfig {
                batch_size: 1,
                delay_ms: 0,
            });
        (
            CircleCiClients::new(&config).unwrap(),
            PrivateClients::new(&config).unwrap(),
        )
    }

    async fn mock_workflow(server: &mut mockito::Server) {
        server
            .mock("GET", "/api/v2/workflow/w1")
            .with_body(
                json!({"id": "w1", "name": "build", "pipeline_id": "p1",
                    "project_slug": "gh/org/repo", "status": "running"})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/workflow/w1/job")
            .with_body(
                json!({"items": [
                    {"id": "j1", "job_number": 10, "name": "build", "status": "running"},
                    {"id": "j2", "job_number": 11, "name": "deploy", "status": "running"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn picks_last_job_with_ssh_step() {
        let mut server = mockito::Server::new_async().await;
        mock_workflow(&mut server).await;
        server
            .mock("GET", "/api/v1.1/project/gh/org/repo/11")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.1/project/gh/org/repo/10")
            .with_body(
                json!({"build_num": 10, "workflows": {"job_name": "build"},
                    "steps": [{"name": "Enable SSH", "actions": [{"index": 0, "step": 101, "failed": null}]}]})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/private/output/raw/gh/org/repo/10/output/0/101")
            .with_body("$ ssh -p 2222 1.2.3.4\n")
            .create_async()
            .await;
        server
            .mock("GET", "/api/private/output/raw/gh/org/repo/10/error/0/101")
            .with_body("")
            .create_async()
            .await;
        let (clients, private) = setup(&server);

        let details = get_ssh_details(&clients, &private.step_output, "w1", None)
            .await
            .unwrap();

        assert_eq!(
            details,
            Some(SshDetails {
                job_number: 10,
                job_name: "build".to_string(),
                command: "ssh -p 2222 1.2.3.4".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn unknown_job_number_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        mock_workflow(&mut server).await;
        let (clients, private) = setup(&server);

        let err = get_ssh_details(&clients, &private.step_output, "w1", Some(99))
            .await
            .unwrap_err();

        assert!(matches!(err, CciError::NotFound(_)));
    }

    #[tokio::test]
    async fn no_ssh_step_yet_is_none() {
        let mut server = mockito::Server::new_async().await;
        mock_workflow(&mut server).await;
        server
            .mock("GET", "/api/v1.1/project/gh/org/repo/11")
            .with_body(r#"{"build_num":11,"workflows":{"job_name":"deploy"},"steps":[]}"#)
            .create_async()
            .await;
        let (clients, private) = setup(&server);

        let details = get_ssh_details(&clients, &private.step_output, "w1", Some(11))
            .await
            .unwrap();

        assert!(details.is_none());
    }
}
