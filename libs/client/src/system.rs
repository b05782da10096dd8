//! Clients for the system resource kinds.

use hum_types::system::{BlockStorage, Image, Node, NodeNetwork, VirtualMachine};

use crate::macros::{global_client, group_client, namespaced_client};

global_client!(NodeClient, Node, "nodes", "node", "nodes");
group_client!(ImageClient, Image, "images", "image", "images");
namespaced_client!(
    NodeNetworkClient,
    NodeNetwork,
    "nodenetworks",
    "nodeNetwork",
    "nodeNetworks"
);
namespaced_client!(
    BlockStorageClient,
    BlockStorage,
    "blockstorages",
    "blockStorage",
    "blockStorages"
);
namespaced_client!(
    VirtualMachineClient,
    VirtualMachine,
    "virtualmachines",
    "virtualMachine",
    "virtualMachines"
);

impl ImageClient {
    /// Stream the raw bytes of an image entity, served by whichever node
    /// holds it. Used for node-to-node cache hydration.
    pub async fn download(
        &self,
        group: &str,
        image_id: &str,
        tag: &str,
    ) -> crate::Result<reqwest::Response> {
        let path = format!(
            "api/v0/groups/{}/images/{}/tags/{}/download",
            group, image_id, tag
        );
        self.rest.stream(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::Envelope;
    use hum_types::system::BlockStorageState;

    #[test]
    fn test_paths() {
        assert_eq!(NodeClient::path("node01"), "api/v0/nodes/node01");
        assert_eq!(ImageClient::path("g1", "ubuntu"), "api/v0/groups/g1/images/ubuntu");
        assert_eq!(
            BlockStorageClient::path("ns1", "vol-1"),
            "api/v0/namespaces/ns1/blockstorages/vol-1"
        );
        assert_eq!(
            VirtualMachineClient::path("ns1", ""),
            "api/v0/namespaces/ns1/virtualmachines"
        );
    }

    #[test]
    fn test_envelope_get_deserialization() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "code": 200,
                "error": null,
                "data": {
                    "blockStorage": {
                        "id": "vol-1",
                        "name": "vol-1",
                        "group": "g1",
                        "namespace": "ns1",
                        "spec": {"limitSize": "1G", "from": {"type": "empty"}},
                        "status": {"state": "Active"}
                    }
                }
            }"#,
        )
        .unwrap();

        let bs: BlockStorage = envelope.data_field("blockStorage").unwrap();
        assert_eq!(bs.meta.id, "vol-1");
        assert_eq!(bs.status.state, BlockStorageState::Active);
    }

    #[test]
    fn test_envelope_list_deserialization() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "code": 200,
                "error": null,
                "data": {
                    "blockStorages": [
                        {"id": "vol-1", "status": {"state": "Active"}},
                        {"id": "vol-2", "status": {"state": "Pending"}}
                    ]
                }
            }"#,
        )
        .unwrap();

        let list: Vec<BlockStorage> = envelope.list_field("blockStorages").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].status.state, BlockStorageState::Pending);
    }

    #[test]
    fn test_envelope_null_list_is_empty() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"code": 200, "error": null, "data": {"blockStorages": null}}"#)
                .unwrap();
        let list: Vec<BlockStorage> = envelope.list_field("blockStorages").unwrap();
        assert!(list.is_empty());
    }
}
