//! Hardware and license register kept by data-center operations. Any signed-in
//! user may read it; only operators change it.

use chrono::Utc;
use tracing::info;

use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::asset::{AssetId, AssetQuery, AssetView, NewAsset};
use vmgate_core::domain::license::{License, LicenseId, LicenseQuery, NewLicense};
use vmgate_core::domain::page::Page;
use vmgate_core::domain::physical_server::{NewPhysicalServer, PhysicalServer, PhysicalServerId};
use vmgate_core::domain::user::Principal;
use vmgate_core::errors::WorkflowError;

use super::{authenticated, new_id, require_any_role, OPERATOR_ROLES};
use crate::repositories::{asset, audit, license, physical_server, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct CatalogService {
    pool: DbPool,
}

impl CatalogService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_assets(
        &self,
        principal: Option<&Principal>,
        query: &AssetQuery,
    ) -> Result<Page<AssetView>, WorkflowError> {
        authenticated(principal)?;
        let today = Utc::now().date_naive();
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (items, total) = asset::list_assets(&mut conn, query, today).await?;
        let items = items.into_iter().map(|row| row.view(today)).collect();
        Ok(Page::for_query(items, total, query))
    }

    pub async fn asset(
        &self,
        principal: Option<&Principal>,
        id: &AssetId,
    ) -> Result<AssetView, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let found = asset::find_asset(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("asset", &id.0))?;
        Ok(found.view(Utc::now().date_naive()))
    }

    pub async fn create_asset(
        &self,
        principal: Option<&Principal>,
        input: NewAsset,
    ) -> Result<AssetView, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "registering assets")?;
        input.validate()?;

        let now = Utc::now();
        let created = input.into_asset(AssetId(new_id("AST")), now, now);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        asset::save_asset(&mut tx, &created).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Asset,
                &created.id.0,
                "asset.created",
                Some(&principal.user_id.0),
            )
            .with_metadata("asset_type", created.asset_type.as_str()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "asset.created",
            asset_id = %created.id.0,
            asset_type = created.asset_type.as_str(),
            operator_id = %principal.user_id.0,
            "asset registered"
        );
        Ok(created.view(now.date_naive()))
    }

    /// Replaces every field of the asset; `created_at` is preserved.
    pub async fn update_asset(
        &self,
        principal: Option<&Principal>,
        id: &AssetId,
        input: NewAsset,
    ) -> Result<AssetView, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "editing assets")?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let existing = asset::find_asset(&mut tx, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("asset", &id.0))?;
        let now = Utc::now();
        let updated = input.into_asset(existing.id, existing.created_at, now);
        asset::save_asset(&mut tx, &updated).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Asset,
                &id.0,
                "asset.updated",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "asset.updated",
            asset_id = %id.0,
            operator_id = %principal.user_id.0,
            "asset updated"
        );
        Ok(updated.view(now.date_naive()))
    }

    pub async fn delete_asset(
        &self,
        principal: Option<&Principal>,
        id: &AssetId,
    ) -> Result<(), WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "removing assets")?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !asset::delete_asset(&mut tx, id).await? {
            return Err(WorkflowError::not_found("asset", &id.0));
        }
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Asset,
                &id.0,
                "asset.deleted",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "asset.deleted",
            asset_id = %id.0,
            operator_id = %principal.user_id.0,
            "asset removed"
        );
        Ok(())
    }

    pub async fn list_licenses(
        &self,
        principal: Option<&Principal>,
        query: &LicenseQuery,
    ) -> Result<Page<License>, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (items, total) = license::list_licenses(&mut conn, query).await?;
        Ok(Page::for_query(items, total, query))
    }

    pub async fn license(
        &self,
        principal: Option<&Principal>,
        id: &LicenseId,
    ) -> Result<License, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        license::find_license(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("license", &id.0))
    }

    pub async fn create_license(
        &self,
        principal: Option<&Principal>,
        input: NewLicense,
    ) -> Result<License, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "registering licenses")?;
        input.validate()?;

        let now = Utc::now();
        let created = input.into_license(LicenseId(new_id("LIC")), now, now);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        license::save_license(&mut tx, &created).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::License,
                &created.id.0,
                "license.created",
                Some(&principal.user_id.0),
            )
            .with_metadata("license_type", created.license_type.as_str()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "license.created",
            license_id = %created.id.0,
            vendor = %created.vendor,
            operator_id = %principal.user_id.0,
            "license registered"
        );
        Ok(created)
    }

    pub async fn update_license(
        &self,
        principal: Option<&Principal>,
        id: &LicenseId,
        input: NewLicense,
    ) -> Result<License, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "editing licenses")?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let existing = license::find_license(&mut tx, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("license", &id.0))?;
        let updated = input.into_license(existing.id, existing.created_at, Utc::now());
        license::save_license(&mut tx, &updated).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::License,
                &id.0,
                "license.updated",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "license.updated",
            license_id = %id.0,
            operator_id = %principal.user_id.0,
            "license updated"
        );
        Ok(updated)
    }

    pub async fn delete_license(
        &self,
        principal: Option<&Principal>,
        id: &LicenseId,
    ) -> Result<(), WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "removing licenses")?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !license::delete_license(&mut tx, id).await? {
            return Err(WorkflowError::not_found("license", &id.0));
        }
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::License,
                &id.0,
                "license.deleted",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "license.deleted",
            license_id = %id.0,
            operator_id = %principal.user_id.0,
            "license removed"
        );
        Ok(())
    }

    pub async fn list_servers(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Vec<PhysicalServer>, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(physical_server::list_servers(&mut conn).await?)
    }

    pub async fn server(
        &self,
        principal: Option<&Principal>,
        id: &PhysicalServerId,
    ) -> Result<PhysicalServer, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        physical_server::find_server(&mut conn, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("physical server", &id.0))
    }

    pub async fn create_server(
        &self,
        principal: Option<&Principal>,
        input: NewPhysicalServer,
    ) -> Result<PhysicalServer, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "registering servers")?;
        input.validate()?;

        let now = Utc::now();
        let created = input.into_server(PhysicalServerId(new_id("SRV")), now, now);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        physical_server::save_server(&mut tx, &created).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::PhysicalServer,
                &created.id.0,
                "server.created",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "server.created",
            server_id = %created.id.0,
            operator_id = %principal.user_id.0,
            "server registered"
        );
        Ok(created)
    }

    pub async fn update_server(
        &self,
        principal: Option<&Principal>,
        id: &PhysicalServerId,
        input: NewPhysicalServer,
    ) -> Result<PhysicalServer, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "editing servers")?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let existing = physical_server::find_server(&mut tx, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("physical server", &id.0))?;
        let updated = input.into_server(existing.id, existing.created_at, Utc::now());
        physical_server::save_server(&mut tx, &updated).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::PhysicalServer,
                &id.0,
                "server.updated",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "server.updated",
            server_id = %id.0,
            operator_id = %principal.user_id.0,
            "server updated"
        );
        Ok(updated)
    }

    pub async fn delete_server(
        &self,
        principal: Option<&Principal>,
        id: &PhysicalServerId,
    ) -> Result<(), WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "removing servers")?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !physical_server::delete_server(&mut tx, id).await? {
            return Err(WorkflowError::not_found("physical server", &id.0));
        }
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::PhysicalServer,
                &id.0,
                "server.deleted",
                Some(&principal.user_id.0),
            ),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "server.deleted",
            server_id = %id.0,
            operator_id = %principal.user_id.0,
            "server removed"
        );
        Ok(())
    }
}
