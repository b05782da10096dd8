//! Clients for the core resource kinds.

use hum_types::core::{Group, Namespace, Network};

use crate::macros::{global_client, group_client, namespaced_client};

global_client!(GroupClient, Group, "groups", "group", "groups");
group_client!(
    NamespaceClient,
    Namespace,
    "namespaces",
    "namespace",
    "namespaces"
);
namespaced_client!(NetworkClient, Network, "networks", "network", "networks");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(GroupClient::path(""), "api/v0/groups");
        assert_eq!(GroupClient::path("g1"), "api/v0/groups/g1");
        assert_eq!(
            NamespaceClient::path("g1", "ns1"),
            "api/v0/groups/g1/namespaces/ns1"
        );
        assert_eq!(
            NetworkClient::path("ns1", "net1"),
            "api/v0/namespaces/ns1/networks/net1"
        );
        assert_eq!(NetworkClient::path("ns1", ""), "api/v0/namespaces/ns1/networks");
    }
}
