use crate::error::AppError;
use crate::models::Client;
use photo_vault::{DeleteReport, PhotoVault};
use rusqlite::{Connection, OptionalExtension};

/// Insert a new client and return its row id
pub fn create_client(conn: &Connection, client: &Client) -> Result<i64, AppError> {
    client.validate()?;

    conn.execute(
        "INSERT INTO clients (uuid, name) VALUES (?1, ?2)",
        (&client.uuid, &client.name),
    )?;

    Ok(conn.last_insert_rowid())
}

/// Load a client by uuid
pub fn get_client(conn: &Connection, uuid: &str) -> Result<Client, AppError> {
    conn.query_row(
        "SELECT id, uuid, name FROM clients WHERE uuid = ?1",
        [uuid],
        |row| Client::try_from(row),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("Client {}", uuid)))
}

/// All clients ordered by name
pub fn list_clients(conn: &Connection) -> Result<Vec<Client>, AppError> {
    let mut stmt = conn.prepare("SELECT id, uuid, name FROM clients ORDER BY name, id")?;

    let clients = stmt
        .query_map([], |row| Client::try_from(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(clients)
}

/// Delete a client together with all of its photos.
///
/// Photos go first so a failed ledger update leaves the client in place and
/// the delete can be repeated.
pub async fn delete_client(
    conn: &Connection,
    vault: &PhotoVault,
    uuid: &str,
) -> Result<DeleteReport, AppError> {
    let client = get_client(conn, uuid)?;

    let report = vault.delete_owner_photos(&client.uuid).await?;

    conn.execute("DELETE FROM clients WHERE uuid = ?1", [&client.uuid])?;
    log::info!("Deleted client {} ({})", client.name, client.uuid);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_vault;
    use photo_vault::{PhotoCategory, UploadRequest};

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::database::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_and_get_client() {
        let conn = setup_test_db();
        let client = Client::new("Dana".to_string());

        let id = create_client(&conn, &client).unwrap();
        assert!(id > 0);

        let loaded = get_client(&conn, &client.uuid).unwrap();
        assert_eq!(loaded.name, "Dana");
        assert_eq!(loaded.id, Some(id));

        assert!(matches!(
            get_client(&conn, "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_rejects_invalid_client() {
        let conn = setup_test_db();
        let result = create_client(&conn, &Client::new(" ".to_string()));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(list_clients(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_list_clients_sorted() {
        let conn = setup_test_db();
        create_client(&conn, &Client::new("Sam".to_string())).unwrap();
        create_client(&conn, &Client::new("Alex".to_string())).unwrap();

        let names: Vec<_> = list_clients(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Alex", "Sam"]);
    }

    #[tokio::test]
    async fn test_delete_client_removes_photos() {
        let conn = setup_test_db();
        let (_dir, vault) = test_vault().await;

        let client = Client::new("Dana".to_string());
        create_client(&conn, &client).unwrap();
        let other = Client::new("Sam".to_string());
        create_client(&conn, &other).unwrap();

        let photo = vault
            .upload_photo(UploadRequest::new(
                b"not really a jpeg".to_vec(),
                &client.uuid,
                PhotoCategory::Progress,
            ))
            .await
            .unwrap();
        let kept = vault
            .upload_photo(UploadRequest::new(
                b"another".to_vec(),
                &other.uuid,
                PhotoCategory::Profile,
            ))
            .await
            .unwrap();

        let report = delete_client(&conn, &vault, &client.uuid).await.unwrap();
        assert_eq!(report.records_deleted, 1);
        assert!(vault.get_photo(&photo).await.unwrap().is_none());
        assert!(vault.get_photo(&kept).await.unwrap().is_some());
        assert!(get_client(&conn, &client.uuid).is_err());
        assert_eq!(list_clients(&conn).unwrap().len(), 1);
    }
}
