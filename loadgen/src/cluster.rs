use anyhow::{Context, Result};
use kube::Client;

/// Client from the usual kubeconfig resolution (KUBECONFIG, ~/.kube/config,
/// or in-cluster service account).
pub async fn client() -> Result<Client> {
    Client::try_default()
        .await
        .with_context(|| "Failed to build Kubernetes client from kubeconfig".to_string())
}
