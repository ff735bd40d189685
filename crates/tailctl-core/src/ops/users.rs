// ── User operations ──

use tracing::info;

use crate::error::CoreError;
use crate::model::{Device, User, UserRole};
use crate::ops::devices::{DeviceOps, require_id};

#[derive(Debug, Clone)]
pub struct UserOps {
    devices: DeviceOps,
}

/// Fill `device_ids` with devices whose owner login matches.
fn attach_devices(user: &mut User, devices: &[Device]) {
    user.device_ids = devices
        .iter()
        .filter(|d| d.user.as_deref() == Some(user.login_name.as_str()))
        .map(|d| d.id.clone())
        .collect();
}

impl UserOps {
    pub fn new(devices: DeviceOps) -> Self {
        Self { devices }
    }

    /// Every user in server order. With `with_devices`, each carries the
    /// ids of the devices it owns.
    pub async fn list(&self, with_devices: bool) -> Result<Vec<User>, CoreError> {
        let api = self.devices.api();
        let users = if with_devices {
            let (raw, devices) = tokio::try_join!(
                async { Ok::<_, CoreError>(api.list_users().await?) },
                self.devices.all(),
            )?;
            let mut users: Vec<User> = raw.into_iter().map(User::from).collect();
            for user in &mut users {
                attach_devices(user, &devices);
            }
            users
        } else {
            api.list_users().await?.into_iter().map(User::from).collect()
        };
        info!(count = users.len(), with_devices, "users listed");
        Ok(users)
    }

    pub async fn get(&self, user_id: &str, with_devices: bool) -> Result<User, CoreError> {
        require_id("user_id", user_id)?;
        let raw = self.devices.api().get_user(user_id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::not_found("user", user_id)
            } else {
                e.into()
            }
        })?;
        let mut user = User::from(raw);
        if with_devices {
            attach_devices(&mut user, &self.devices.all().await?);
        }
        Ok(user)
    }

    /// Change a user's role. Ownership cannot be assigned this way.
    pub async fn set_role(&self, user_id: &str, role: UserRole) -> Result<User, CoreError> {
        require_id("user_id", user_id)?;
        if role == UserRole::Owner {
            return Err(CoreError::validation(
                "role",
                "ownership is transferred from the admin console, not assigned",
            ));
        }
        self.devices
            .api()
            .set_user_role(user_id, &role.to_string())
            .await?;
        info!(user_id, %role, "user role changed");
        self.get(user_id, false).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::DeviceStatus;

    fn device(id: &str, owner: Option<&str>) -> Device {
        Device {
            id: id.into(),
            node_id: None,
            name: format!("{id}.example.ts.net"),
            hostname: None,
            os: None,
            addresses: BTreeSet::new(),
            authorized: true,
            tags: BTreeSet::new(),
            last_seen: None,
            connected_to_control: false,
            status: DeviceStatus::Unknown,
            is_exit_node: false,
            is_subnet_router: false,
            user: owner.map(str::to_owned),
            client_version: None,
            update_available: false,
            key_expiry: None,
            key_expiry_disabled: false,
            advertised_routes: Vec::new(),
            enabled_routes: Vec::new(),
        }
    }

    #[test]
    fn devices_attach_by_login() {
        let mut user = User {
            id: "u1".into(),
            login_name: "alice@example.com".into(),
            display_name: None,
            role: Some(UserRole::Member),
            status: None,
            last_seen: None,
            device_ids: Vec::new(),
        };
        let devices = [
            device("d1", Some("alice@example.com")),
            device("d2", Some("bob@example.com")),
            device("d3", None),
            device("d4", Some("alice@example.com")),
        ];
        attach_devices(&mut user, &devices);
        assert_eq!(user.device_ids, vec!["d1", "d4"]);
    }
}
