//! Customer and address database operations.

use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::{AddressId, CustomerId, Email, Phone};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{Address, Customer, NewAddress};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, loyalty_points, created_at";
const ADDRESS_COLUMNS: &str = "id, customer_id, label, street, number, complement, neighborhood, \
                               city, state, cep, reference, is_default, created_at";

#[derive(sqlx::FromRow)]
struct CustomerWithHash {
    #[sqlx(flatten)]
    customer: Customer,
    password_hash: String,
}

/// Repository for customer database operations.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepository<'a> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a customer by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn get_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(customer)
    }

    /// Get a customer and their password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, email))]
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Customer, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerWithHash>(&format!(
            "SELECT {CUSTOMER_COLUMNS}, password_hash FROM customer WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|r| (r.customer, r.password_hash)))
    }

    /// Create a customer with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is already registered.
    #[instrument(skip(self, email, password_hash))]
    pub async fn create(
        &self,
        name: &str,
        email: &Email,
        phone: &Phone,
        password_hash: &str,
    ) -> Result<Customer, RepositoryError> {
        sqlx::query_as::<_, Customer>(&format!(
            r"
            INSERT INTO customer (name, email, phone, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {CUSTOMER_COLUMNS}
            "
        ))
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email already registered"))
    }

    /// Update a customer's name and phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn update_profile(
        &self,
        id: CustomerId,
        name: &str,
        phone: &Phone,
    ) -> Result<Customer, RepositoryError> {
        sqlx::query_as::<_, Customer>(&format!(
            r"
            UPDATE customer SET name = $2, phone = $3
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// List a customer's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn addresses(&self, customer_id: CustomerId) -> Result<Vec<Address>, RepositoryError> {
        let addresses = sqlx::query_as::<_, Address>(&format!(
            r"
            SELECT {ADDRESS_COLUMNS} FROM address
            WHERE customer_id = $1
            ORDER BY is_default DESC, created_at
            "
        ))
        .bind(customer_id)
        .fetch_all(self.pool)
        .await?;
        Ok(addresses)
    }

    /// Get one of the customer's addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %id))]
    pub async fn address(
        &self,
        customer_id: CustomerId,
        id: AddressId,
    ) -> Result<Option<Address>, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM address WHERE id = $1 AND customer_id = $2"
        ))
        .bind(id)
        .bind(customer_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(address)
    }

    /// Save a new address. A default address replaces the previous default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[instrument(skip(self, address), fields(customer_id = %customer_id))]
    pub async fn create_address(
        &self,
        customer_id: CustomerId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let has_any: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM address WHERE customer_id = $1)")
                .bind(customer_id)
                .fetch_one(&mut *tx)
                .await?;
        // The first address is always the default.
        let is_default = address.is_default || !has_any;

        if is_default {
            clear_default(&mut tx, customer_id).await?;
        }

        let created = sqlx::query_as::<_, Address>(&format!(
            r"
            INSERT INTO address (customer_id, label, street, number, complement,
                                 neighborhood, city, state, cep, reference, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(customer_id)
        .bind(&address.label)
        .bind(&address.street)
        .bind(&address.number)
        .bind(&address.complement)
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.cep)
        .bind(&address.reference)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    /// Replace an address's fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to
    /// the customer.
    #[instrument(skip(self, address), fields(customer_id = %customer_id, address_id = %id))]
    pub async fn update_address(
        &self,
        customer_id: CustomerId,
        id: AddressId,
        address: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if address.is_default {
            clear_default(&mut tx, customer_id).await?;
        }

        let updated = sqlx::query_as::<_, Address>(&format!(
            r"
            UPDATE address
            SET label = $3, street = $4, number = $5, complement = $6, neighborhood = $7,
                city = $8, state = $9, cep = $10, reference = $11,
                is_default = is_default OR $12
            WHERE id = $1 AND customer_id = $2
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(id)
        .bind(customer_id)
        .bind(&address.label)
        .bind(&address.street)
        .bind(&address.number)
        .bind(&address.complement)
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.cep)
        .bind(&address.reference)
        .bind(address.is_default)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete an address.
    ///
    /// # Returns
    ///
    /// Returns `true` if the address was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %id))]
    pub async fn delete_address(
        &self,
        customer_id: CustomerId,
        id: AddressId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM address WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(customer_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Make an address the customer's default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to
    /// the customer.
    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %id))]
    pub async fn set_default_address(
        &self,
        customer_id: CustomerId,
        id: AddressId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        clear_default(&mut tx, customer_id).await?;

        let result =
            sqlx::query("UPDATE address SET is_default = TRUE WHERE id = $1 AND customer_id = $2")
                .bind(id)
                .bind(customer_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn clear_default(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    customer_id: CustomerId,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE address SET is_default = FALSE WHERE customer_id = $1 AND is_default")
        .bind(customer_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
