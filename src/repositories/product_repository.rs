use crate::{
    entities::{
        product::{self, Entity as Product},
        product_variant::{self, Entity as ProductVariant},
        stock_movement,
    },
    errors::ServiceError,
    services::stock::StockTarget,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

pub struct ProductRepository;

impl ProductRepository {
    pub async fn find_owned<C>(db: &C, user_id: Uuid, product_id: Uuid) -> Result<product::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        Product::find_by_id(product_id)
            .filter(product::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Resolves the stock-bearing entity for a product owned by `user_id`.
    /// A variant must belong to that product.
    pub async fn owned_target<C>(
        db: &C,
        user_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<StockTarget, ServiceError>
    where
        C: ConnectionTrait,
    {
        let product = Self::find_owned(db, user_id, product_id).await?;
        if let Some(variant_id) = variant_id {
            ProductVariant::find_by_id(variant_id)
                .filter(product_variant::Column::ProductId.eq(product.id))
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
        }
        Ok(StockTarget::resolve(product.id, variant_id))
    }

    /// The product that carries `target`, or its parent product for a variant.
    pub async fn owner_of<C>(db: &C, target: StockTarget) -> Result<Option<product::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let product_id = match target {
            StockTarget::Product(id) => id,
            StockTarget::Variant(id) => match ProductVariant::find_by_id(id).one(db).await? {
                Some(variant) => variant.product_id,
                None => return Ok(None),
            },
        };
        Ok(Product::find_by_id(product_id).one(db).await?)
    }

    /// Loads a movement whose stock target belongs to `user_id`.
    pub async fn find_owned_movement<C>(
        db: &C,
        user_id: Uuid,
        movement_id: Uuid,
    ) -> Result<stock_movement::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let not_found = || ServiceError::NotFound(format!("Stock movement {} not found", movement_id));
        let movement = stock_movement::Entity::find_by_id(movement_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;

        let target = StockTarget::from_columns(movement.product_id, movement.variant_id)
            .ok_or_else(not_found)?;
        match Self::owner_of(db, target).await? {
            Some(product) if product.user_id == user_id => Ok(movement),
            _ => Err(not_found()),
        }
    }
}
