//! Thin identity-resolution seam in front of the classifier.
//!
//! QR token, roll number and manual pick all collapse to a student row here;
//! the classifier itself never sees raw scan payloads.

use sqlx::SqlitePool;

use crate::model::directory::Student;
use crate::model::scan::Identity;

pub async fn resolve(
    pool: &SqlitePool,
    identity: &Identity,
) -> Result<Option<Student>, sqlx::Error> {
    let query = match identity {
        Identity::StudentId(_) => {
            "SELECT id, roll, full_name, qr_token, section_id, active \
             FROM students WHERE id = ? AND active = 1"
        }
        Identity::QrToken(_) => {
            "SELECT id, roll, full_name, qr_token, section_id, active \
             FROM students WHERE qr_token = ? AND active = 1"
        }
        Identity::Roll(_) => {
            "SELECT id, roll, full_name, qr_token, section_id, active \
             FROM students WHERE roll = ? AND active = 1"
        }
    };

    let q = sqlx::query_as::<_, Student>(query);
    let q = match identity {
        Identity::StudentId(id) => q.bind(*id),
        Identity::QrToken(token) => q.bind(token.clone()),
        Identity::Roll(roll) => q.bind(roll.clone()),
    };
    q.fetch_optional(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = crate::db::test_pool().await;
        sqlx::query(
            "INSERT INTO students (id, roll, full_name, qr_token, section_id, active) \
             VALUES (1, '2026-0001', 'Ana Reyes', 'QR-ANA', 1, 1), \
                    (2, '2026-0002', 'Ben Cruz', NULL, 1, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[actix_web::test]
    async fn resolves_all_three_adapters() {
        let pool = pool().await;

        let by_id = resolve(&pool, &Identity::StudentId(1)).await.unwrap().unwrap();
        let by_qr = resolve(&pool, &Identity::QrToken("QR-ANA".into()))
            .await
            .unwrap()
            .unwrap();
        let by_roll = resolve(&pool, &Identity::Roll("2026-0001".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.id, 1);
        assert_eq!(by_qr.id, 1);
        assert_eq!(by_roll.id, 1);
    }

    #[actix_web::test]
    async fn inactive_students_do_not_resolve() {
        let pool = pool().await;
        assert!(resolve(&pool, &Identity::StudentId(2)).await.unwrap().is_none());
        assert!(
            resolve(&pool, &Identity::QrToken("NOPE".into()))
                .await
                .unwrap()
                .is_none()
        );
    }
}
