use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::StreamExt;
use tokio::time::timeout;

use appointment_cell::models::*;
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::services::notification::AppointmentNotificationBus;
use appointment_cell::store::MemoryRecordStore;
use shared_utils::test_utils::TestUser;

struct Clinic {
    bus: AppointmentNotificationBus,
    booking: AppointmentBookingService,
    lifecycle: AppointmentLifecycleService,
}

fn clinic() -> Clinic {
    let store = Arc::new(MemoryRecordStore::new());
    let bus = AppointmentNotificationBus::new(16);
    Clinic {
        booking: AppointmentBookingService::new(store.clone(), bus.clone(), SchedulingRules::default()),
        lifecycle: AppointmentLifecycleService::new(store, bus.clone(), &SchedulingRules::default()),
        bus,
    }
}

fn june_15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

#[tokio::test]
async fn subscriber_sees_exactly_one_event_for_its_appointment() {
    let clinic = clinic();
    let p1 = TestUser::patient("p1@example.com").to_user();
    let p2 = TestUser::patient("p2@example.com").to_user();
    let d1 = TestUser::doctor("d1@example.com").to_user();

    let booked = clinic
        .booking
        .book_appointment(&p1, BookAppointmentRequest {
            patient_id: p1.id,
            doctor_id: d1.id,
            date: june_15(),
            time: "10:00".to_string(),
        })
        .await
        .unwrap();

    let clash = clinic
        .booking
        .book_appointment(&p2, BookAppointmentRequest {
            patient_id: p2.id,
            doctor_id: d1.id,
            date: june_15(),
            time: "10:00".to_string(),
        })
        .await;
    assert!(matches!(clash, Err(AppointmentError::Conflict(_))));

    let mut subscription = clinic.bus.subscribe(booked.id());
    clinic.lifecycle.update_status(booked.id(), "Confirmed", Some(&d1)).await.unwrap();

    let event = timeout(Duration::from_secs(1), subscription.next()).await.unwrap().unwrap();
    assert_eq!(event.id(), booked.id());
    assert_eq!(event.status(), AppointmentStatus::Confirmed);
    assert!(subscription.try_next().is_none());
}

#[tokio::test]
async fn changes_to_other_appointments_are_filtered_out() {
    let clinic = clinic();
    let patient = TestUser::patient("p1@example.com").to_user();
    let doctor = TestUser::doctor("d1@example.com").to_user();

    let mut ids = Vec::new();
    for time in ["09:00", "10:00"] {
        let booked = clinic
            .booking
            .book_appointment(&patient, BookAppointmentRequest {
                patient_id: patient.id,
                doctor_id: doctor.id,
                date: june_15(),
                time: time.to_string(),
            })
            .await
            .unwrap();
        ids.push(booked.id());
    }

    let mut watching_first = clinic.bus.subscribe(ids[0]);
    clinic.lifecycle.update_status(ids[1], "Confirmed", None).await.unwrap();

    assert!(watching_first.try_next().is_none());
    assert!(timeout(Duration::from_millis(50), watching_first.next()).await.is_err());
}

#[tokio::test]
async fn late_subscribers_get_no_replay() {
    let clinic = clinic();
    let patient = TestUser::patient("p1@example.com").to_user();
    let doctor = TestUser::doctor("d1@example.com").to_user();

    let booked = clinic
        .booking
        .book_appointment(&patient, BookAppointmentRequest {
            patient_id: patient.id,
            doctor_id: doctor.id,
            date: june_15(),
            time: "10:00".to_string(),
        })
        .await
        .unwrap();
    clinic.lifecycle.update_status(booked.id(), "Confirmed", None).await.unwrap();

    let mut late = clinic.bus.subscribe(booked.id());
    assert!(late.try_next().is_none());

    clinic.booking.cancel_appointment(&patient, booked.id()).await.unwrap();
    assert_eq!(late.try_next().map(|a| a.status()), Some(AppointmentStatus::Cancelled));
}

#[tokio::test]
async fn cancelled_subscription_is_unregistered_immediately() {
    let clinic = clinic();
    let watched = uuid::Uuid::new_v4();

    let first = clinic.bus.subscribe(watched);
    let second = clinic.bus.subscribe(watched);
    assert_eq!(clinic.bus.active_subscriptions(), 2);

    first.cancel();
    assert_eq!(clinic.bus.active_subscriptions(), 1);

    drop(second);
    assert_eq!(clinic.bus.active_subscriptions(), 0);
}

#[tokio::test]
async fn every_subscription_to_the_same_appointment_receives_the_change() {
    let clinic = clinic();
    let patient = TestUser::patient("p1@example.com").to_user();
    let doctor = TestUser::doctor("d1@example.com").to_user();

    let booked = clinic
        .booking
        .book_appointment(&patient, BookAppointmentRequest {
            patient_id: patient.id,
            doctor_id: doctor.id,
            date: june_15(),
            time: "10:00".to_string(),
        })
        .await
        .unwrap();

    let patient_view = clinic.bus.subscribe(booked.id()).into_stream();
    let doctor_view = clinic.bus.subscribe(booked.id()).into_stream();
    tokio::pin!(patient_view);
    tokio::pin!(doctor_view);

    clinic.booking.cancel_appointment(&doctor, booked.id()).await.unwrap();

    let seen_by_patient = timeout(Duration::from_secs(1), patient_view.next()).await.unwrap().unwrap();
    let seen_by_doctor = timeout(Duration::from_secs(1), doctor_view.next()).await.unwrap().unwrap();
    assert_eq!(seen_by_patient, seen_by_doctor);
    assert_eq!(seen_by_patient.status(), AppointmentStatus::Cancelled);
}
