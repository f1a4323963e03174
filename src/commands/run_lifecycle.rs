use std::io::Write;

use crate::authenticator::HttpAuthenticator;
use crate::config::LifecycleConfig;
use crate::http_client::HttpClient;
use crate::lifecycle::{
    Confirmation, LifecycleError, LifecycleOrchestrator, LifecyclePlan, LifecycleReport,
};
use crate::resource::PollingPolicy;
use crate::resource::arm_client::HttpResourceClient;
use crate::resource::key_vault::VaultOptions;
use crate::token_retriever::TokenRetrieverWithCache;

/// Wires the identity endpoint and the resource manager over the same HTTP client and runs
/// the Key Vault lifecycle.
pub struct RunLifecycleCommand<C>
where
    C: HttpClient + Clone,
{
    http_client: C,
    polling: PollingPolicy,
}

impl<C> RunLifecycleCommand<C>
where
    C: HttpClient + Clone,
{
    pub fn new(http_client: C) -> Self {
        Self {
            http_client,
            polling: PollingPolicy::default(),
        }
    }

    pub fn with_polling(self, polling: PollingPolicy) -> Self {
        Self { polling, ..self }
    }

    pub fn run<P, W>(
        &self,
        config: &LifecycleConfig,
        vault: &VaultOptions,
        confirmation: P,
        out: &mut W,
    ) -> Result<LifecycleReport, LifecycleError>
    where
        P: Confirmation,
        W: Write,
    {
        let authenticator =
            HttpAuthenticator::new(self.http_client.clone(), config.identity.endpoint.clone());
        let token_retriever = TokenRetrieverWithCache::new(
            authenticator,
            config.environment.token_audience().to_string(),
            config.identity.selector.clone(),
        );
        let resource_client = HttpResourceClient::new(
            self.http_client.clone(),
            config.identity.subscription_id.clone(),
            &config.environment,
        )
        .with_polling(self.polling);

        LifecycleOrchestrator::new(
            LifecyclePlan::key_vault(config, vault),
            token_retriever,
            resource_client,
            confirmation,
        )
        .run(out)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use http::Uri;
    use httpmock::Method::{DELETE, GET, POST, PUT};
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;
    use crate::config::{IdentityContext, IdentityEndpoint, IdentitySelector};
    use crate::environment::AzureEnvironment;
    use crate::http::client::HttpClient as ReqwestHttpClient;
    use crate::http::config::HttpConfig;
    use crate::lifecycle::{AutoConfirm, LifecycleState};
    use crate::resource::error::ResourceClientError;

    const VAULT_PATH: &str =
        "/subscriptions/sub-1/resourcegroups/rg1/providers/Microsoft.KeyVault/vaults/sampleVault8976";
    const AUDIENCE: &str = "https://management.core.windows.net/";

    fn config(server: &MockServer, selector: IdentitySelector) -> LifecycleConfig {
        LifecycleConfig {
            identity: IdentityContext {
                tenant_id: Some("tenant-1".to_string()),
                subscription_id: "sub-1".to_string(),
                endpoint: IdentityEndpoint::Custom(server.url("/oauth2/token").parse::<Uri>().unwrap()),
                selector,
            },
            resource_group: "rg1".to_string(),
            environment: AzureEnvironment::Custom {
                resource_manager_endpoint: server.base_url().parse().unwrap(),
                token_audience: AUDIENCE.to_string(),
            },
        }
    }

    fn command() -> RunLifecycleCommand<ReqwestHttpClient> {
        RunLifecycleCommand::new(ReqwestHttpClient::new(HttpConfig::default()).unwrap()).with_polling(
            PollingPolicy {
                interval: Duration::from_millis(10),
                max_polls: 3,
            },
        )
    }

    fn token_body() -> String {
        let expires_on = chrono::Utc::now().timestamp() + 3600;
        format!(
            r#"{{"access_token":"arm-token","expires_in":"3599","expires_on":"{expires_on}","resource":"{AUDIENCE}","token_type":"Bearer"}}"#
        )
    }

    #[test]
    fn full_lifecycle_with_user_assigned_identity() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .header("metadata", "true")
                .body("resource=https%3A%2F%2Fmanagement.core.windows.net%2F&client_id=client-1");
            then.status(200).body(token_body());
        });
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path(VAULT_PATH)
                .query_param("api-version", "2015-06-01")
                .header("authorization", "Bearer arm-token")
                .json_body(json!({
                    "location": "westcentralus",
                    "properties": {
                        "sku": { "family": "A", "name": "standard" },
                        "tenantId": "tenant-1",
                        "accessPolicies": [],
                        "enabledForDeployment": true,
                        "enabledForTemplateDeployment": true,
                        "enabledForDiskEncryption": true,
                    }
                }));
            then.status(200).json_body(json!({
                "id": "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.KeyVault/vaults/sampleVault8976",
                "name": "sampleVault8976",
                "location": "westcentralus",
                "properties": {"vaultUri": "https://samplevault8976.vault.azure.net/"}
            }));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE)
                .path(VAULT_PATH)
                .query_param("api-version", "2015-06-01")
                .header("authorization", "Bearer arm-token");
            then.status(200);
        });

        let mut out = Vec::<u8>::new();
        let report = command()
            .run(
                &config(&server, IdentitySelector::ClientId("client-1".to_string())),
                &VaultOptions::default(),
                AutoConfirm,
                &mut out,
            )
            .unwrap();

        assert_eq!(report.state, LifecycleState::Deleted);
        assert_eq!(
            report.created.properties["vaultUri"],
            "https://samplevault8976.vault.azure.net/"
        );
        // One token for both calls.
        token.assert_hits(1);
        put.assert();
        delete.assert();
    }

    #[test]
    fn accepted_delete_is_polled() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200).body(token_body());
        });
        server.mock(|when, then| {
            when.method(PUT).path(VAULT_PATH);
            then.status(200).json_body(json!({"properties": {}}));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(VAULT_PATH);
            then.status(202)
                .header("location", server.url("/operations/delete-1"))
                .header("retry-after", "0");
        });
        let poll = server.mock(|when, then| {
            when.method(GET)
                .path("/operations/delete-1")
                .header("authorization", "Bearer arm-token");
            then.status(200);
        });

        let report = command()
            .run(
                &config(&server, IdentitySelector::SystemAssigned),
                &VaultOptions::default(),
                AutoConfirm,
                &mut std::io::sink(),
            )
            .unwrap();

        assert_eq!(report.state, LifecycleState::Deleted);
        delete.assert();
        poll.assert();
    }

    #[test]
    fn forbidden_create_leaves_nothing_to_delete() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/token");
            then.status(200).body(token_body());
        });
        server.mock(|when, then| {
            when.method(PUT).path(VAULT_PATH);
            then.status(403).json_body(json!({
                "error": {"code": "AuthorizationFailed", "message": "identity lacks access"}
            }));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path(VAULT_PATH);
            then.status(200);
        });

        let error = command()
            .run(
                &config(&server, IdentitySelector::SystemAssigned),
                &VaultOptions::default(),
                AutoConfirm,
                &mut std::io::sink(),
            )
            .unwrap_err();

        assert_matches!(
            error,
            LifecycleError::RemoteApi(ResourceClientError::UnsuccessfulResponse { status: 403, code, .. }) => {
                assert_eq!(code, "AuthorizationFailed");
            }
        );
        delete.assert_hits(0);
    }

    #[test]
    fn unreachable_identity_endpoint() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT).path(VAULT_PATH);
            then.status(200);
        });
        let mut config = config(&server, IdentitySelector::SystemAssigned);
        // Nothing listens on the discard port.
        config.identity.endpoint = IdentityEndpoint::Local { port: 9 };

        let error = command()
            .run(&config, &VaultOptions::default(), AutoConfirm, &mut std::io::sink())
            .unwrap_err();

        assert_matches!(error, LifecycleError::Authentication(_));
        put.assert_hits(0);
    }
}
