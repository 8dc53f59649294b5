//! SQLite column mapping: identifiers are stored as their 26-character text.
//!
//! Reading a value that does not decode is an error, never a NULL.

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type};

use super::Ulid;

impl Type<Sqlite> for Ulid {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Ulid {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, BoxDynError> {
        <String as Encode<'q, Sqlite>>::encode(Ulid::encode(self), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for Ulid {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<'r, Sqlite>>::decode(value)?;
        Ok(Ulid::decode(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    #[tokio::test]
    async fn test_ulid_column_round_trip() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query("CREATE TABLE items (id TEXT PRIMARY KEY NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let id = Ulid::generate();
        sqlx::query("INSERT INTO items (id) VALUES (?)")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let raw: String = sqlx::query_scalar("SELECT id FROM items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(raw, Ulid::encode(&id));

        let row = sqlx::query("SELECT id FROM items").fetch_one(&pool).await.unwrap();
        let back: Ulid = row.try_get("id").unwrap();
        assert_eq!(back, id);
    }

    #[tokio::test]
    async fn test_corrupt_column_is_an_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query("CREATE TABLE items (id TEXT PRIMARY KEY NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (id) VALUES ('not-a-valid-identifier')")
            .execute(&pool)
            .await
            .unwrap();

        let row = sqlx::query("SELECT id FROM items").fetch_one(&pool).await.unwrap();
        let result: Result<Ulid, _> = row.try_get("id");
        assert!(matches!(result, Err(sqlx::Error::ColumnDecode { .. })));
    }
}
