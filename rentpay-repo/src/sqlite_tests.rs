//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use rentpay_rates::{ConversionRate, CurrencyCode};
    use rentpay_types::{
        ApplyOutcome, Booking, BookingId, Caller, DepositStatus, DomainError, FinalState,
        GatewayEvent, IgnoreReason, LinkStatus, MethodType, Payment, PaymentIntent,
        PaymentRepository, RepoError, SecurityDepositAuthorization, WebhookEvent, WebhookStatus,
        domain::{OpenedLink, calculate},
    };

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_booking(repo: &SqliteRepo, currency: CurrencyCode) -> Booking {
        let booking = Booking::new(
            BookingId::new(),
            100_000,
            currency,
            50_000,
            Decimal::new(30, 0),
        )
        .unwrap();
        repo.upsert_booking(&booking).await.unwrap()
    }

    /// Builds an unsaved payment for `booking`, with its link opened.
    async fn new_payment(
        repo: &SqliteRepo,
        booking: &Booking,
        method_type: MethodType,
        intent: PaymentIntent,
        session: Option<&str>,
    ) -> Payment {
        let method = repo.get_method(method_type).await.unwrap().unwrap();
        let base = booking.amount_due(intent).unwrap();
        let calc = calculate(base, intent, &method, Caller::Admin, None).unwrap();
        let now = Utc::now();
        let mut payment = Payment::new(booking.id, &calc, now);
        // Manual payments carry no link and stay pending until settled.
        if method_type == MethodType::Manual {
            return payment;
        }
        payment
            .activate(
                OpenedLink {
                    url: Some("https://pay.example.test/checkout".into()),
                    expires_at: Some(now + Duration::hours(24)),
                    gateway_session_id: session.map(String::from),
                    ..OpenedLink::default()
                },
                now,
            )
            .unwrap();
        payment
    }

    fn completed(reference: &str) -> GatewayEvent {
        GatewayEvent {
            reference: reference.to_string(),
            transaction_id: Some(format!("txn_{}", reference)),
            final_state: FinalState::Completed,
            occurred_at: Utc::now(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Methods and rates
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_seeded_methods() {
        let repo = setup_repo().await;

        let methods = repo.list_methods().await.unwrap();
        let types: Vec<MethodType> = methods.iter().map(|m| m.method_type).collect();

        assert_eq!(
            types,
            vec![
                MethodType::VisaMastercard,
                MethodType::Amex,
                MethodType::BankTransfer,
                MethodType::Manual
            ]
        );
        assert_eq!(methods[0].fee_percentage, Decimal::new(29, 1));
        assert_eq!(methods[0].settlement_currency, CurrencyCode::CHF);
        assert!(methods[3].admin_only);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let repo = setup_repo().await;
        repo.create_schema().await.unwrap();

        assert_eq!(repo.list_methods().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_save_method() {
        let repo = setup_repo().await;

        let mut amex = repo.get_method(MethodType::Amex).await.unwrap().unwrap();
        amex.fee_percentage = Decimal::new(4, 0);
        amex.is_enabled = false;
        repo.save_method(&amex).await.unwrap();

        let saved = repo.get_method(MethodType::Amex).await.unwrap().unwrap();
        assert_eq!(saved.fee_percentage, Decimal::new(4, 0));
        assert!(!saved.is_enabled);
    }

    #[tokio::test]
    async fn test_latest_rate_ignores_future_and_prefers_latest_recorded() {
        let repo = setup_repo().await;
        let now = Utc::now();
        let day = now - Duration::days(1);

        for (rate, at) in [
            (Decimal::new(101, 2), now - Duration::days(3)),
            (Decimal::new(102, 2), day),
            (Decimal::new(103, 2), day),
            (Decimal::new(150, 2), now + Duration::days(2)),
        ] {
            let rate =
                ConversionRate::new(CurrencyCode::EUR, CurrencyCode::CHF, rate, at, "manual")
                    .unwrap();
            repo.insert_rate(&rate).await.unwrap();
        }

        let current = repo
            .latest_rate(CurrencyCode::EUR, CurrencyCode::CHF, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.rate, Decimal::new(103, 2));

        let none = repo
            .latest_rate(CurrencyCode::CHF, CurrencyCode::EUR, now)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_list_rates_filters_by_pair() {
        let repo = setup_repo().await;
        let at = Utc::now() - Duration::hours(1);

        for (from, to) in [
            (CurrencyCode::EUR, CurrencyCode::CHF),
            (CurrencyCode::USD, CurrencyCode::CHF),
            (CurrencyCode::EUR, CurrencyCode::USD),
        ] {
            let rate = ConversionRate::new(from, to, Decimal::ONE, at, "manual").unwrap();
            repo.insert_rate(&rate).await.unwrap();
        }

        assert_eq!(repo.list_rates(None, None).await.unwrap().len(), 3);
        assert_eq!(
            repo.list_rates(Some(CurrencyCode::EUR), None)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            repo.list_rates(None, Some(CurrencyCode::CHF))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bookings and payments
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_upsert_booking_keeps_amount_paid() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::EUR).await;

        let payment = new_payment(
            &repo,
            &booking,
            MethodType::Manual,
            PaymentIntent::ClientPayment,
            None,
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();
        repo.settle_payment(payment.id, Utc::now()).await.unwrap();

        let mut refreshed = booking.clone();
        refreshed.amount_total = 120_000;
        let stored = repo.upsert_booking(&refreshed).await.unwrap();

        assert_eq!(stored.amount_total, 120_000);
        assert_eq!(stored.amount_paid, payment.total_amount);
    }

    #[tokio::test]
    async fn test_payment_round_trip_and_lookup() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;

        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            Some("sess_lookup"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let fetched = repo.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(fetched.amount, 30_000);
        assert_eq!(fetched.fee_amount, 870);
        assert_eq!(fetched.converted_amount, Some(30_870));
        assert_eq!(fetched.conversion_rate, Some(Decimal::ONE));
        assert_eq!(fetched.payment_link_status, LinkStatus::Active);

        let by_ref = repo
            .find_payment_by_gateway_ref("sess_lookup")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.id, payment.id);

        let listed = repo.list_payments_for_booking(booking.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_update_payment_is_compare_and_set() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            Some("sess_cas"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let mut cancelled = payment.clone();
        cancelled.cancel(Utc::now()).unwrap();
        assert!(repo
            .update_payment(&cancelled, LinkStatus::Active)
            .await
            .unwrap());

        // Stale writer still believes the link is active.
        let mut failed = payment.clone();
        failed.mark_failed(Utc::now()).unwrap();
        assert!(!repo.update_payment(&failed, LinkStatus::Active).await.unwrap());

        let stored = repo.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_link_status, LinkStatus::Cancelled);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_completed_event_credits_booking_once() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            Some("sess_once"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let outcome = repo.apply_gateway_event(&completed("sess_once")).await.unwrap();
        match &outcome {
            ApplyOutcome::Settled {
                payment, credited, ..
            } => {
                assert_eq!(payment.payment_link_status, LinkStatus::Paid);
                assert_eq!(payment.gateway_transaction_id.as_deref(), Some("txn_sess_once"));
                assert_eq!(credited.amount(), 30_870);
            }
            other => panic!("expected settlement, got {:?}", other),
        }

        let replay = repo.apply_gateway_event(&completed("sess_once")).await.unwrap();
        assert!(matches!(
            replay,
            ApplyOutcome::Ignored {
                reason: IgnoreReason::AlreadyTerminal(LinkStatus::Paid),
                ..
            }
        ));

        let stored = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid, 30_870);
    }

    #[tokio::test]
    async fn test_event_by_transaction_id_after_settlement_is_ignored() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::Amex,
            PaymentIntent::ClientPayment,
            Some("sess_txn"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();
        repo.apply_gateway_event(&completed("sess_txn")).await.unwrap();

        let late = repo
            .apply_gateway_event(&completed("txn_sess_txn"))
            .await
            .unwrap();
        assert!(late.is_ignored());
    }

    #[tokio::test]
    async fn test_failed_event_marks_payment_failed() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            Some("sess_fail"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let mut event = completed("sess_fail");
        event.final_state = FinalState::Failed;
        let outcome = repo.apply_gateway_event(&event).await.unwrap();

        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));
        let stored = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid, 0);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_reported() {
        let repo = setup_repo().await;

        let result = repo.apply_gateway_event(&completed("sess_missing")).await;

        assert!(matches!(result, Err(RepoError::UnknownTransaction(r)) if r == "sess_missing"));
    }

    #[tokio::test]
    async fn test_deposit_event_confirms_hold() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::SecurityDeposit,
            Some("sess_hold"),
        )
        .await;
        let mut hold = SecurityDepositAuthorization::request(
            booking.id,
            payment.amount,
            booking.currency,
            72,
            Utc::now(),
        )
        .unwrap();
        hold.payment_id = Some(payment.id);
        repo.insert_authorization(&hold, &payment).await.unwrap();

        let outcome = repo.apply_gateway_event(&completed("sess_hold")).await.unwrap();
        let ApplyOutcome::Settled {
            authorization,
            credited,
            ..
        } = outcome
        else {
            panic!("expected settlement");
        };
        assert_eq!(authorization.unwrap().status, DepositStatus::Authorized);
        assert!(credited.is_zero());

        let stored_hold = repo.get_authorization(hold.id).await.unwrap().unwrap();
        assert_eq!(stored_hold.status, DepositStatus::Authorized);
        assert!(stored_hold.authorized_at.is_some());

        let stored = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.security_deposit_authorization_id, Some(hold.id));
        assert!(stored.security_deposit_authorized_at.is_some());
        assert_eq!(stored.amount_paid, 0);

        let holds = repo
            .list_authorizations_for_booking(booking.id)
            .await
            .unwrap();
        assert_eq!(holds.len(), 1);
    }

    #[tokio::test]
    async fn test_update_authorization_is_compare_and_set() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::SecurityDeposit,
            Some("sess_hold_cas"),
        )
        .await;
        let mut hold = SecurityDepositAuthorization::request(
            booking.id,
            50_000,
            booking.currency,
            24,
            Utc::now(),
        )
        .unwrap();
        hold.payment_id = Some(payment.id);
        repo.insert_authorization(&hold, &payment).await.unwrap();

        let mut confirmed = hold.clone();
        confirmed.confirm(Utc::now()).unwrap();
        assert!(repo
            .update_authorization(&confirmed, DepositStatus::Pending)
            .await
            .unwrap());
        assert!(!repo
            .update_authorization(&confirmed, DepositStatus::Pending)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_admin_settles_manual_payment() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::EUR).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::Manual,
            PaymentIntent::BalancePayment,
            None,
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let paid_at = Utc::now() - Duration::hours(2);
        let outcome = repo.settle_payment(payment.id, paid_at).await.unwrap();

        let settled = outcome.payment();
        assert_eq!(settled.payment_link_status, LinkStatus::Paid);
        assert!(settled.paid_at.is_some());

        let stored = repo.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid, 100_000);
    }

    #[tokio::test]
    async fn test_admin_cannot_settle_card_payment() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::CHF).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::VisaMastercard,
            PaymentIntent::ClientPayment,
            Some("sess_admin"),
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let result = repo.settle_payment(payment.id, Utc::now()).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::UnsupportedMethodFlow { .. }))
        ));
    }

    #[tokio::test]
    async fn test_bank_transfer_needs_proof_before_settlement() {
        let repo = setup_repo().await;
        let booking = seed_booking(&repo, CurrencyCode::EUR).await;
        let payment = new_payment(
            &repo,
            &booking,
            MethodType::BankTransfer,
            PaymentIntent::ClientPayment,
            None,
        )
        .await;
        repo.insert_payment(&payment).await.unwrap();

        let early = repo.settle_payment(payment.id, Utc::now()).await;
        assert!(matches!(
            early,
            Err(RepoError::Domain(DomainError::ValidationError(_)))
        ));

        let mut with_proof = payment.clone();
        with_proof
            .attach_proof("https://files.example.test/receipt.pdf".into(), Utc::now())
            .unwrap();
        assert!(repo
            .update_payment(&with_proof, LinkStatus::Active)
            .await
            .unwrap());

        let outcome = repo.settle_payment(payment.id, Utc::now()).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Settled { .. }));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gateway event journal
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_webhook_journal() {
        let repo = setup_repo().await;

        let event = WebhookEvent::new(
            Some("sess_journal".into()),
            json!({"entityId": "sess_journal", "state": "COMPLETED"}),
        );
        repo.record_webhook(&event).await.unwrap();

        let received = repo
            .list_webhooks(Some(WebhookStatus::Received), 10)
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload["state"], "COMPLETED");

        repo.update_webhook_status(
            event.id,
            WebhookStatus::Failed,
            None,
            Some("Unknown transaction".into()),
        )
        .await
        .unwrap();

        let failed = repo
            .list_webhooks(Some(WebhookStatus::Failed), 10)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("Unknown transaction"));
        assert!(failed[0].processed_at.is_some());
        assert!(repo
            .list_webhooks(Some(WebhookStatus::Received), 10)
            .await
            .unwrap()
            .is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let repo = setup_repo().await;

        let (key, raw) = repo.create_api_key("ops").await.unwrap();
        assert_eq!(repo.count_api_keys().await.unwrap(), 1);

        let hash = crate::security::hash_api_key(&raw);
        let verified = repo.verify_api_key_hash(&hash).await.unwrap().unwrap();
        assert_eq!(verified.id, key.id);
        assert!(verified.last_used_at.is_some());

        assert!(repo.delete_api_key(key.id).await.unwrap());
        assert!(!repo.delete_api_key(key.id).await.unwrap());
        assert!(repo.verify_api_key_hash(&hash).await.unwrap().is_none());
        assert!(repo.list_api_keys().await.unwrap().is_empty());
    }
}
