//! 注册与积分入账集成测试
//!
//! 使用真实 PostgreSQL 测试注册幂等、预订入账、倍率与升级奖励的
//! 完整写入路径。入账服务内部通过 sqlx 事务操作数据库，无法通过
//! 纯 mock 覆盖，因此需要集成测试。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test transaction_flow_test -- --ignored
//! ```

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use loyalty_engine::error::LoyaltyError;
use loyalty_engine::lock::MemberLockManager;
use loyalty_engine::models::Tier;
use loyalty_engine::repository::{MemberRepository, TransactionRepository};
use loyalty_engine::service::dto::{CompletedStay, EnrollRequest};
use loyalty_engine::service::{MemberService, TransactionService};

// ==================== 辅助函数 ====================

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

fn member_service(pool: &PgPool) -> MemberService<MemberRepository> {
    MemberService::new(MemberRepository::new(pool.clone()), None)
}

fn transaction_service(pool: &PgPool) -> TransactionService {
    TransactionService::new(
        Arc::new(MemberRepository::new(pool.clone())),
        Arc::new(TransactionRepository::new(pool.clone())),
        Arc::new(MemberLockManager::with_defaults()),
        None,
        pool.clone(),
    )
}

/// 注册一个测试会员并返回 member_id
async fn enroll_member(pool: &PgPool, user_id: &str) -> Uuid {
    let response = member_service(pool)
        .enroll(EnrollRequest::new(user_id, format!("{user_id}@example.com")))
        .await
        .expect("注册应成功");
    response.member_id
}

fn stay(booking_ref: &str, member_id: Uuid, amount_cents: i64, nights: i32) -> CompletedStay {
    CompletedStay {
        booking_ref: booking_ref.to_string(),
        member_id,
        amount_cents,
        nights,
        property_id: "prop-hz-001".to_string(),
    }
}

/// 清理测试数据，按外键依赖顺序删除
async fn cleanup_test_data(pool: &PgPool, user_ids: &[&str]) {
    for uid in user_ids {
        sqlx::query(
            "DELETE FROM loyalty_redemptions WHERE member_id IN (SELECT id FROM loyalty_members WHERE user_id = $1)",
        )
        .bind(uid)
        .execute(pool)
        .await
        .ok();

        sqlx::query(
            "DELETE FROM loyalty_transactions WHERE member_id IN (SELECT id FROM loyalty_members WHERE user_id = $1)",
        )
        .bind(uid)
        .execute(pool)
        .await
        .ok();

        sqlx::query("DELETE FROM loyalty_members WHERE user_id = $1")
            .bind(uid)
            .execute(pool)
            .await
            .ok();
    }
}

// ==================== 测试用例 ====================

/// 重复注册同一 user_id 应返回同一个账户
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_enroll_idempotent() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_enroll_idem_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let svc = member_service(&pool);

    let first = svc
        .enroll(EnrollRequest::new(user_id, "a@example.com"))
        .await
        .unwrap();
    assert!(first.newly_enrolled);
    assert_eq!(first.tier, Tier::Bronze);

    let second = svc
        .enroll(EnrollRequest::new(user_id, "b@example.com"))
        .await
        .unwrap();
    assert!(!second.newly_enrolled);
    assert_eq!(second.member_id, first.member_id);

    cleanup_test_data(&pool, &[user_id]).await;
}

/// 并发注册同一 user_id 只产生一个账户
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_enroll_concurrent_race() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_enroll_race_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let user_id = user_id.to_string();
        handles.push(tokio::spawn(async move {
            member_service(&pool)
                .enroll(EnrollRequest::new(&user_id, format!("{user_id}@example.com")))
                .await
        }));
    }

    let mut member_ids = Vec::new();
    let mut newly_enrolled = 0;
    for handle in handles {
        let response = handle.await.unwrap().expect("并发注册不应报错");
        if response.newly_enrolled {
            newly_enrolled += 1;
        }
        member_ids.push(response.member_id);
    }

    assert_eq!(newly_enrolled, 1, "应恰好有一个请求真正创建账户");
    assert!(
        member_ids.iter().all(|id| *id == member_ids[0]),
        "所有请求应返回同一账户"
    );

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM loyalty_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    cleanup_test_data(&pool, &[user_id]).await;
}

/// 预订入账：基础积分 = 金额（元）+ 间夜 × 100，bronze 倍率 1.0
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_booking_accrual_basic() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_booking_basic_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let member_id = enroll_member(&pool, user_id).await;
    let svc = transaction_service(&pool);

    // 500 元 + 2 晚 = 500 + 200 = 700 基础积分，bronze 不放大
    let response = svc
        .add_points_from_booking(stay("BK-INTEG-0001", member_id, 50_000, 2))
        .await
        .unwrap();

    assert_eq!(response.points, 700);
    assert_eq!(response.balance_after, 700);
    assert_eq!(response.tier, Tier::Bronze);
    assert!(!response.duplicate);

    let summary = member_service(&pool).get_member(member_id).await.unwrap();
    assert_eq!(summary.available_points, 700);
    assert_eq!(summary.total_points, 700);
    assert_eq!(summary.lifetime_points, 700);
    assert_eq!(summary.total_stays, 1);
    assert_eq!(summary.total_nights, 2);

    cleanup_test_data(&pool, &[user_id]).await;
}

/// 同一订单号重复上报返回已有流水，余额不变
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_booking_accrual_idempotent() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_booking_idem_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let member_id = enroll_member(&pool, user_id).await;
    let svc = transaction_service(&pool);

    let first = svc
        .add_points_from_booking(stay("BK-INTEG-0002", member_id, 30_000, 1))
        .await
        .unwrap();
    assert!(!first.duplicate);

    let second = svc
        .add_points_from_booking(stay("BK-INTEG-0002", member_id, 30_000, 1))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.transaction_id, first.transaction_id);

    // 余额未被重复入账
    let summary = member_service(&pool).get_member(member_id).await.unwrap();
    assert_eq!(summary.available_points, first.balance_after);

    let tx_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loyalty_transactions WHERE booking_ref = 'BK-INTEG-0002'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(tx_count, 1);

    cleanup_test_data(&pool, &[user_id]).await;
}

/// 跨越 silver 阈值时发放升级奖励并写入 bonus 流水
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_booking_triggers_tier_upgrade_bonus() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_booking_upgrade_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let member_id = enroll_member(&pool, user_id).await;
    let svc = transaction_service(&pool);

    // 2400 元 + 2 晚 = 2600 基础积分，跨过 silver 阈值 2500
    let response = svc
        .add_points_from_booking(stay("BK-INTEG-0003", member_id, 240_000, 2))
        .await
        .unwrap();

    assert_eq!(response.tier, Tier::Silver);
    assert_eq!(response.tier_changed_from, Some(Tier::Bronze));
    // silver 序号 2 × 500 = 1000 奖励
    assert_eq!(response.bonus_points, Some(1_000));

    let summary = member_service(&pool).get_member(member_id).await.unwrap();
    assert_eq!(summary.available_points, 3_600);
    assert_eq!(summary.total_points, 3_600);

    let bonus_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loyalty_transactions WHERE member_id = $1 AND tx_type = 'BONUS'",
    )
    .bind(member_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(bonus_count, 1, "应恰好有一条升级奖励流水");

    cleanup_test_data(&pool, &[user_id]).await;
}

/// 入账不存在的会员应返回 MemberNotFound
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_booking_unknown_member() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let svc = transaction_service(&pool);

    let missing = Uuid::now_v7();
    let result = svc
        .add_points_from_booking(stay("BK-INTEG-MISSING", missing, 10_000, 1))
        .await;

    assert!(matches!(result, Err(LoyaltyError::MemberNotFound(id)) if id == missing));
}

/// 未显式写入 tier_affecting 的流水行默认不影响等级进度
#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_tier_affecting_column_defaults_to_false() {
    let pool = PgPool::connect(&database_url()).await.unwrap();
    let user_id = "integ_tier_affecting_default_001";
    cleanup_test_data(&pool, &[user_id]).await;

    let member_id = enroll_member(&pool, user_id).await;

    // 绕过仓储的带外插入，tier_affecting 走列默认值
    let tx_id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO loyalty_transactions
            (id, member_id, tx_type, points, balance_after, description,
             source, transaction_date)
        VALUES ($1, $2, 'EARNED', 100, 100, '带外插入', 'BOOKING', NOW())
        "#,
    )
    .bind(tx_id)
    .bind(member_id)
    .execute(&pool)
    .await
    .unwrap();

    let tier_affecting: bool =
        sqlx::query_scalar("SELECT tier_affecting FROM loyalty_transactions WHERE id = $1")
            .bind(tx_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(!tier_affecting, "列默认值不应声明等级影响");

    cleanup_test_data(&pool, &[user_id]).await;
}
