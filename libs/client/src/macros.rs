//! Macros for defining per-kind API clients.
//!
//! Three macros, one per path shape: global kinds (`api/v0/<kind>`),
//! group-scoped kinds (`api/v0/groups/<g>/<kind>`), and namespaced kinds
//! (`api/v0/namespaces/<ns>/<kind>` — the namespace alone routes these;
//! the group lives on the record, not in the path). Each generates a
//! client with `get`/`list`/`create`/`update`/`delete` decoding the
//! envelope's per-kind data keys.

macro_rules! global_client {
    ($name:ident, $resource:ty, $path:literal, $one:literal, $many:literal) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            rest: crate::rest::Rest,
        }

        impl $name {
            pub(crate) fn new(rest: crate::rest::Rest) -> Self {
                Self { rest }
            }

            fn path(id: &str) -> String {
                let mut path = format!("api/v0/{}", $path);
                if !id.is_empty() {
                    path.push('/');
                    path.push_str(id);
                }
                path
            }

            pub async fn get(&self, id: &str) -> crate::Result<$resource> {
                self.rest.get(&Self::path(id)).await?.data_field($one)
            }

            pub async fn list(&self) -> crate::Result<Vec<$resource>> {
                self.rest.get(&Self::path("")).await?.list_field($many)
            }

            pub async fn create(&self, resource: &$resource) -> crate::Result<$resource> {
                self.rest
                    .post(&Self::path(""), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn update(&self, resource: &$resource) -> crate::Result<$resource> {
                let meta = hum_types::Resource::meta(resource);
                self.rest
                    .put(&Self::path(&meta.id), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn delete(&self, id: &str) -> crate::Result<()> {
                self.rest.delete(&Self::path(id)).await
            }
        }
    };
}

macro_rules! group_client {
    ($name:ident, $resource:ty, $path:literal, $one:literal, $many:literal) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            rest: crate::rest::Rest,
        }

        impl $name {
            pub(crate) fn new(rest: crate::rest::Rest) -> Self {
                Self { rest }
            }

            fn path(group: &str, id: &str) -> String {
                let mut path = format!("api/v0/groups/{}/{}", group, $path);
                if !id.is_empty() {
                    path.push('/');
                    path.push_str(id);
                }
                path
            }

            pub async fn get(&self, group: &str, id: &str) -> crate::Result<$resource> {
                self.rest
                    .get(&Self::path(group, id))
                    .await?
                    .data_field($one)
            }

            pub async fn list(&self, group: &str) -> crate::Result<Vec<$resource>> {
                self.rest
                    .get(&Self::path(group, ""))
                    .await?
                    .list_field($many)
            }

            pub async fn create(&self, resource: &$resource) -> crate::Result<$resource> {
                let meta = hum_types::Resource::meta(resource);
                self.rest
                    .post(&Self::path(&meta.group, ""), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn update(&self, resource: &$resource) -> crate::Result<$resource> {
                let meta = hum_types::Resource::meta(resource);
                self.rest
                    .put(&Self::path(&meta.group, &meta.id), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn delete(&self, group: &str, id: &str) -> crate::Result<()> {
                self.rest.delete(&Self::path(group, id)).await
            }
        }
    };
}

macro_rules! namespaced_client {
    ($name:ident, $resource:ty, $path:literal, $one:literal, $many:literal) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            rest: crate::rest::Rest,
        }

        impl $name {
            pub(crate) fn new(rest: crate::rest::Rest) -> Self {
                Self { rest }
            }

            fn path(namespace: &str, id: &str) -> String {
                let mut path = format!("api/v0/namespaces/{}/{}", namespace, $path);
                if !id.is_empty() {
                    path.push('/');
                    path.push_str(id);
                }
                path
            }

            pub async fn get(&self, namespace: &str, id: &str) -> crate::Result<$resource> {
                self.rest
                    .get(&Self::path(namespace, id))
                    .await?
                    .data_field($one)
            }

            pub async fn list(&self, namespace: &str) -> crate::Result<Vec<$resource>> {
                self.rest
                    .get(&Self::path(namespace, ""))
                    .await?
                    .list_field($many)
            }

            pub async fn create(&self, resource: &$resource) -> crate::Result<$resource> {
                let meta = hum_types::Resource::meta(resource);
                self.rest
                    .post(&Self::path(&meta.namespace, ""), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn update(&self, resource: &$resource) -> crate::Result<$resource> {
                let meta = hum_types::Resource::meta(resource);
                self.rest
                    .put(&Self::path(&meta.namespace, &meta.id), resource)
                    .await?
                    .data_field($one)
            }

            pub async fn delete(&self, namespace: &str, id: &str) -> crate::Result<()> {
                self.rest.delete(&Self::path(namespace, id)).await
            }
        }
    };
}

pub(crate) use {global_client, group_client, namespaced_client};
