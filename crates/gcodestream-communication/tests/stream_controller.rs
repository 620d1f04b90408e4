mod common;

use common::{connected_controller, drain, grbl_settings, job, stream_result, MockCommunicator};
use gcodestream_communication::{IoThreads, JobEstimator, StreamController};
use gcodestream_core::{ControllerError, ControllerState, Error, StreamEvent, StreamState, Units};
use gcodestream_parser::{JobLoader, StoreKind};
use gcodestream_settings::{FirmwareKind, StreamSettings};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_job_streams_and_completes() {
    let (controller, link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller
        .load_job(job(&["G1 X10", "G1 Y5", "G1 X0 Y0"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.state(), StreamState::Sending);
    assert_eq!(controller.total_rows(), 3);

    assert_eq!(controller.transmit_ready().unwrap(), 3);
    assert_eq!(link.lines(), vec!["G1 X10", "G1 Y5", "G1 X0 Y0"]);
    assert_eq!(controller.outstanding(), 7 + 6 + 10);

    for _ in 0..3 {
        controller.handle_line("ok").unwrap();
    }
    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(controller.outstanding(), 0);
    assert_eq!(controller.rows_completed(), 3);
    assert_eq!(controller.rows_remaining(), 0);
    assert!(controller.send_duration().is_some());

    let events = drain(&mut events);
    assert_eq!(stream_result(&events), Some(true));
    assert!(events.contains(&StreamEvent::StreamStateChanged(StreamState::Sending)));
}

#[test]
fn test_events_ordered_per_command() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller.load_job(job(&["G0 X1"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();

    let kinds: Vec<&str> = drain(&mut events)
        .iter()
        .map(|event| match event {
            StreamEvent::CommandQueued { .. } => "queued",
            StreamEvent::CommandSent { .. } => "sent",
            StreamEvent::CommandComplete { .. } => "complete",
            StreamEvent::StreamStateChanged(_) => "state",
            StreamEvent::StreamComplete { .. } => "done",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["state", "queued", "sent", "complete", "state", "done"]);
}

#[test]
fn test_byte_counting_waits_for_ack() {
    let (controller, link) = connected_controller(grbl_settings(20));

    controller
        .load_job(job(&["G1 X100 Y200 Z300", "G1 X0"]))
        .unwrap();
    controller.send().unwrap();

    assert_eq!(controller.transmit_ready().unwrap(), 1);
    assert_eq!(controller.outstanding(), 18);
    assert!(!controller.transmit_next(Duration::from_millis(10)).unwrap());

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.outstanding(), 0);
    assert_eq!(controller.transmit_ready().unwrap(), 1);
    assert_eq!(link.lines().len(), 2);
}

#[test]
fn test_transmit_next_wakes_on_ack() {
    let (controller, _link) = connected_controller(grbl_settings(10));
    let controller = Arc::new(controller);

    controller.load_job(job(&["G1 X1", "G1 X2"])).unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    let acker = {
        let controller = Arc::clone(&controller);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            controller.handle_line("ok").unwrap();
        })
    };
    assert!(controller.transmit_next(Duration::from_secs(5)).unwrap());
    acker.join().unwrap();
    assert_eq!(controller.rows_sent(), 2);
}

#[test]
fn test_cancel_rejected_while_paused() {
    let (controller, link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1", "G1 X2"])).unwrap();
    controller.send().unwrap();
    controller.pause().unwrap();
    assert_eq!(link.realtime(), vec![b'!']);

    let err = controller.cancel().unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(controller.state(), StreamState::Paused);

    // Nothing is pulled from the job while paused.
    assert_eq!(controller.transmit_ready().unwrap(), 0);

    controller.resume().unwrap();
    assert_eq!(link.realtime(), vec![b'!', b'~']);
    assert_eq!(controller.transmit_ready().unwrap(), 2);
}

#[test]
fn test_cancel_stops_further_sends() {
    let (controller, link) = connected_controller(grbl_settings(10));
    let mut events = controller.subscribe();

    controller
        .load_job(job(&["G1 X1", "G1 X2", "G1 X3", "G1 X4", "G1 X5"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    controller.cancel().unwrap();
    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(stream_result(&drain(&mut events)), Some(false));

    // The in-flight command still drains, nothing new is sent.
    controller.handle_line("ok").unwrap();
    assert_eq!(controller.outstanding(), 0);
    assert_eq!(controller.transmit_ready().unwrap(), 0);
    assert_eq!(link.lines(), vec!["G1 X1"]);
}

#[test]
fn test_stale_ack_does_not_count_for_next_job() {
    let (controller, _link) = connected_controller(grbl_settings(10));

    controller.load_job(job(&["G1 X1", "G1 X2"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();
    controller.cancel().unwrap();

    controller.load_job(job(&["G1 Y1"])).unwrap();
    controller.send().unwrap();
    // Still blocked by the cancelled job's command.
    assert_eq!(controller.transmit_ready().unwrap(), 0);

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.rows_completed(), 0);
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.rows_completed(), 1);
    assert_eq!(controller.state(), StreamState::Idle);
}

#[test]
fn test_precondition_errors() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    assert!(controller.send().unwrap_err().is_precondition());
    assert!(controller.pause().unwrap_err().is_precondition());
    assert!(controller.resume().unwrap_err().is_precondition());
    assert!(controller.cancel().unwrap_err().is_precondition());

    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();
    assert!(controller.send().unwrap_err().is_precondition());
    assert!(controller
        .load_job(job(&["G1 X2"]))
        .unwrap_err()
        .is_precondition());
}

#[test]
fn test_send_requires_connection() {
    let (comm, _link) = MockCommunicator::new();
    let controller = StreamController::new(Box::new(comm), grbl_settings(128)).unwrap();

    controller.load_job(job(&["G1 X1"])).unwrap();
    assert!(matches!(
        controller.send(),
        Err(Error::Controller(ControllerError::NotConnected))
    ));
    assert!(matches!(
        controller.send_command_immediately("$X"),
        Err(Error::Controller(ControllerError::NotConnected))
    ));
    assert!(controller.has_job());
}

#[test]
fn test_invalid_settings_rejected() {
    let (comm, _link) = MockCommunicator::new();
    let settings = StreamSettings {
        buffer_capacity: 0,
        ..StreamSettings::default()
    };
    assert!(StreamController::new(Box::new(comm), settings).is_err());
}

#[test]
fn test_error_ack_fails_stream() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller.load_job(job(&["G1 X1", "M3 S1000"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();
    controller.handle_line("error:20").unwrap();

    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(controller.error_count(), 1);
    assert_eq!(controller.rows_completed(), 2);

    let events = drain(&mut events);
    assert_eq!(stream_result(&events), Some(false));
    let rejected = events.iter().find_map(|event| match event {
        StreamEvent::CommandComplete {
            command,
            error: Some(error),
            ..
        } => Some((command.clone(), error.clone())),
        _ => None,
    });
    let (command, error) = rejected.unwrap();
    assert_eq!(command, "M3 S1000");
    assert!(error.contains("error:20"));
}

#[test]
fn test_alarm_aborts_stream() {
    let (controller, link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller
        .load_job(job(&["G1 X1", "G1 X2", "G1 X3"]))
        .unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();

    let err = controller.handle_line("ALARM:1").unwrap_err();
    assert!(matches!(
        err,
        Error::Controller(ControllerError::Alarm { code: 1, .. })
    ));
    assert_eq!(controller.state(), StreamState::Alarm);
    assert_eq!(controller.rows_completed(), 1);
    assert_eq!(controller.outstanding(), 0);
    assert_eq!(controller.transmit_ready().unwrap(), 0);

    let events = drain(&mut events);
    let alarm = events
        .iter()
        .position(|event| matches!(event, StreamEvent::Alarm { code: 1, .. }))
        .unwrap();
    let state = events
        .iter()
        .position(|event| *event == StreamEvent::StreamStateChanged(StreamState::Alarm))
        .unwrap();
    let done = events
        .iter()
        .position(|event| matches!(event, StreamEvent::StreamComplete { success: false, .. }))
        .unwrap();
    assert!(alarm < state && state < done);

    // Only a reset leaves the alarm state.
    assert!(controller.send().unwrap_err().is_precondition());
    controller.soft_reset().unwrap();
    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(link.realtime(), vec![0x18]);
}

#[test]
fn test_ack_with_nothing_in_flight_aborts() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();

    assert!(matches!(
        controller.handle_line("ok"),
        Err(Error::Controller(ControllerError::UnexpectedCommand { .. }))
    ));
    assert_eq!(controller.state(), StreamState::Alarm);
}

#[test]
fn test_command_larger_than_buffer_overflows() {
    let (controller, _link) = connected_controller(grbl_settings(5));

    controller.load_job(job(&["G1 X100"])).unwrap();
    controller.send().unwrap();

    assert!(matches!(
        controller.transmit_ready(),
        Err(Error::Controller(ControllerError::BufferOverflow { .. }))
    ));
    assert_eq!(controller.state(), StreamState::Alarm);
}

#[test]
fn test_firmware_overflow_error_aborts() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1", "G1 X2"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();

    assert!(matches!(
        controller.handle_line("error:11"),
        Err(Error::Controller(ControllerError::BufferOverflow { .. }))
    ));
    assert_eq!(controller.state(), StreamState::Alarm);
}

#[test]
fn test_reset_banner_while_streaming_aborts() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();

    controller
        .handle_line("Grbl 1.1h ['$' for help]")
        .unwrap();
    assert_eq!(controller.state(), StreamState::Alarm);
    assert_eq!(controller.in_flight(), 0);
}

#[test]
fn test_manual_commands_go_first() {
    let (controller, link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();
    controller.send_command_immediately("$X").unwrap();

    assert_eq!(controller.transmit_ready().unwrap(), 2);
    assert_eq!(link.lines(), vec!["$X", "G1 X1"]);
    assert_eq!(controller.rows_sent(), 1);

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.rows_completed(), 0);
    controller.handle_line("ok").unwrap();
    assert_eq!(controller.rows_completed(), 1);
}

#[test]
fn test_empty_manual_command_rejected() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    assert!(matches!(
        controller.send_command_immediately("   "),
        Err(Error::Controller(ControllerError::CommandRejected { .. }))
    ));
}

#[test]
fn test_await_completion_ok() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    let controller = Arc::new(controller);

    let id = controller.send_command_immediately("$H").unwrap();
    controller.transmit_ready().unwrap();

    let acker = {
        let controller = Arc::clone(&controller);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            controller.handle_line("ok").unwrap();
        })
    };
    controller
        .await_completion(&id, Duration::from_secs(5))
        .unwrap();
    acker.join().unwrap();
}

#[test]
fn test_await_completion_already_done() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    let id = controller.send_command_immediately("G4 P0").unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();

    controller
        .await_completion(&id, Duration::from_millis(10))
        .unwrap();
}

#[test]
fn test_await_completion_rejected() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    let id = controller.send_command_immediately("G999").unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("error:20").unwrap();

    match controller.await_completion(&id, Duration::from_millis(10)) {
        Err(Error::Controller(ControllerError::CommandRejected { command, reason })) => {
            assert_eq!(command, "G999");
            assert!(reason.contains("error:20"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_await_completion_times_out() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    let id = controller.send_command_immediately("$$").unwrap();
    controller.transmit_ready().unwrap();

    let started = Instant::now();
    let err = controller
        .await_completion(&id, Duration::from_millis(50))
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(50));
    match err {
        Error::Controller(ControllerError::Timeout { command, .. }) => assert_eq!(command, "$$"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_soft_reset_fails_waiters() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    let id = controller.send_command_immediately("$H").unwrap();
    controller.transmit_ready().unwrap();
    controller.soft_reset().unwrap();

    assert_eq!(controller.in_flight(), 0);
    assert!(matches!(
        controller.await_completion(&id, Duration::from_millis(10)),
        Err(Error::Controller(ControllerError::CommandRejected { .. }))
    ));
}

#[test]
fn test_jog_restores_absolute_mode_before_job() {
    let mut settings = grbl_settings(128);
    settings.single_step_mode = true;
    let (controller, link) = connected_controller(settings);

    controller
        .load_job(job(&["G1 X1", "G1 X2"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    // Jogging is refused while the job is actively sending.
    assert!(controller
        .jog(1.0, 0.0, 0.0, 500.0, Units::MM)
        .unwrap_err()
        .is_precondition());

    controller.pause().unwrap();
    controller.jog(1.0, 0.0, -0.5, 500.0, Units::MM).unwrap();

    // Manual commands still go out while paused.
    for _ in 0..2 {
        controller.handle_line("ok").unwrap();
        assert_eq!(controller.transmit_ready().unwrap(), 1);
    }
    controller.handle_line("ok").unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 0);
    assert_eq!(
        link.lines(),
        vec!["G1 X1", "G91 G21 G1 X1 Z-0.5 F500", "G90 G21"]
    );

    controller.resume().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);
    assert_eq!(link.lines().last().map(String::as_str), Some("G1 X2"));
}

#[test]
fn test_jog_restores_current_units() {
    let (controller, link) = connected_controller(grbl_settings(128));

    controller.send_command_immediately("G20").unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();

    controller.jog(0.0, 0.25, 0.0, 10.0, Units::MM).unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 2);
    assert_eq!(
        link.lines(),
        vec!["G20", "G91 G21 G1 Y0.25 F10", "G90 G20"]
    );
}

#[test]
fn test_jog_validation() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    assert!(controller
        .jog(0.0, 0.0, 0.0, 500.0, Units::MM)
        .unwrap_err()
        .is_gcode_error());
    assert!(controller
        .jog(1.0, 0.0, 0.0, 0.0, Units::MM)
        .unwrap_err()
        .is_gcode_error());
    assert!(controller
        .jog(f64::NAN, 0.0, 0.0, 100.0, Units::MM)
        .unwrap_err()
        .is_gcode_error());
}

#[test]
fn test_status_from_partial_lines() {
    let (controller, link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    link.push_incoming("<Idle|MPos:1.000,2.000,3.000|WCO:1.000,0.000,0.000>\r\n<Ru");
    assert_eq!(controller.poll_receive().unwrap(), 1);
    let status = controller.status();
    assert_eq!(status.state, ControllerState::Idle);
    assert_eq!(status.work_coordinate.x, 0.0);
    assert_eq!(status.work_coordinate.y, 2.0);

    link.push_incoming("n|MPos:2.000,2.000,3.000|FS:500,0>\n");
    assert_eq!(controller.poll_receive().unwrap(), 1);
    let status = controller.status();
    assert_eq!(status.state, ControllerState::Run);
    assert_eq!(status.work_coordinate.x, 1.0);
    assert_eq!(status.feed_rate, Some(500.0));

    let changes = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, StreamEvent::StatusChanged(_)))
        .count();
    assert_eq!(changes, 2);
    assert_eq!(controller.poll_receive().unwrap(), 0);
}

#[test]
fn test_completed_unit_change_applies_to_status() {
    let (controller, link) = connected_controller(grbl_settings(128));

    controller.send_command_immediately("G20").unwrap();
    controller.transmit_ready().unwrap();
    assert_eq!(controller.units(), Units::MM);

    link.push_incoming("ok\r\n<Idle|MPos:1.000,0.000,0.000>\r\n");
    assert_eq!(controller.poll_receive().unwrap(), 2);
    assert_eq!(controller.units(), Units::INCH);
    assert_eq!(controller.status().units, Units::INCH);
}

#[test]
fn test_estimate_unknown_before_first_row() {
    let (controller, _link) = connected_controller(grbl_settings(10));

    controller.load_job(job(&["G1 X1", "G1 X2"])).unwrap();
    assert_eq!(controller.estimated_duration(), None);

    controller.send().unwrap();
    assert_eq!(controller.estimated_duration(), None);
    assert_eq!(controller.estimated_remaining(), None);

    controller.transmit_ready().unwrap();
    assert!(controller.estimated_duration().is_some());
    assert!(controller.estimated_remaining().is_some());
}

#[test]
fn test_toolpath_estimate_preferred() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    let loaded = JobLoader::default()
        .load_lines(["G1 X10 F60"], StoreKind::InMemory)
        .unwrap();
    let (segments, errors) = JobLoader::default().toolpath(["G1 X10 F60"]).unwrap();
    assert!(errors.is_empty());
    let estimator = JobEstimator::spawn(segments, 1000.0);
    while estimator.estimate().is_none() {
        std::thread::sleep(Duration::from_millis(1));
    }
    controller.set_estimator(estimator);
    controller.load_job(loaded.source).unwrap();

    assert_eq!(
        controller.estimated_duration(),
        Some(Duration::from_secs(10))
    );

    controller.send().unwrap();
    assert_eq!(controller.rows_sent(), 0);
    assert_eq!(controller.estimated_remaining(), None);

    controller.transmit_ready().unwrap();
    let remaining = controller.estimated_remaining().unwrap();
    assert!(remaining <= Duration::from_secs(10));
}

#[test]
fn test_manual_and_job_commands_are_told_apart() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller.send_command_immediately("G4 P0").unwrap();
    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();
    controller.transmit_ready().unwrap();
    controller.handle_line("ok").unwrap();
    controller.handle_line("ok").unwrap();

    let events = drain(&mut events);
    let sent: Vec<(u32, String, bool)> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::CommandSent {
                sequence_number,
                command,
                manual,
            } => Some((*sequence_number, command.clone(), *manual)),
            _ => None,
        })
        .collect();
    assert_eq!(
        sent,
        vec![(1, "G4 P0".to_string(), true), (1, "G1 X1".to_string(), false)]
    );

    let completed: Vec<bool> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::CommandComplete { manual, .. } => Some(*manual),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![true, false]);
    assert_eq!(controller.rows_completed(), 1);
}

#[test]
fn test_single_step_mode() {
    let (controller, link) = connected_controller(grbl_settings(128));
    controller.set_single_step_mode(true);
    assert!(controller.single_step_mode());

    controller
        .load_job(job(&["G1 X1", "G1 X2", "G1 X3"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);
    assert_eq!(controller.in_flight(), 1);

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    controller.set_single_step_mode(false);
    controller.handle_line("ok").unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);
    assert_eq!(link.lines().len(), 3);
}

#[test]
fn test_smoothieware_counts_commands() {
    let settings = StreamSettings {
        firmware: FirmwareKind::Smoothieware,
        buffer_capacity: 2,
        status_poll_interval_ms: 0,
        ..StreamSettings::default()
    };
    let (controller, link) = connected_controller(settings);

    controller
        .load_job(job(&["G1 X1", "G1 X2", "G1 X3", "G1 X4"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 2);
    assert_eq!(controller.outstanding(), 2);

    controller.handle_line("ok").unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 1);

    controller.handle_line("!!").unwrap_err();
    assert_eq!(controller.state(), StreamState::Alarm);
    assert_eq!(link.lines().len(), 3);
}

#[test]
fn test_comment_rows_published() {
    let (controller, link) = connected_controller(grbl_settings(128));
    let mut events = controller.subscribe();

    controller
        .load_job(job(&["(setup)", "G1 X1 (cut)", "G1 X2"]))
        .unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 2);
    assert_eq!(link.lines(), vec!["G1 X1", "G1 X2"]);
    assert_eq!(controller.rows_sent(), 3);
    assert_eq!(controller.rows_completed(), 1);

    controller.handle_line("ok").unwrap();
    controller.handle_line("ok").unwrap();
    assert_eq!(controller.rows_completed(), 3);

    let events = drain(&mut events);
    let comments: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::CommentSeen(comment) => Some(comment.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(comments, vec!["setup", "cut"]);
    assert_eq!(stream_result(&events), Some(true));
}

#[test]
fn test_comment_only_job_completes_immediately() {
    let (controller, link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["(nothing to do)"])).unwrap();
    controller.send().unwrap();
    assert_eq!(controller.transmit_ready().unwrap(), 0);
    assert_eq!(controller.state(), StreamState::Idle);
    assert!(link.lines().is_empty());
}

#[test]
fn test_spooled_job_streams() {
    let (controller, link) = connected_controller(grbl_settings(128));

    let loaded = JobLoader::default()
        .load_lines(["G0 X0 Y0", "G1 X5 F100", "G1 Y5"], StoreKind::Spooled)
        .unwrap();
    assert!(loaded.is_spooled());
    controller.load_job(loaded.source).unwrap();
    controller.send().unwrap();

    assert_eq!(controller.transmit_ready().unwrap(), 3);
    assert_eq!(link.lines(), vec!["G0 X0 Y0", "G1 X5 F100", "G1 Y5"]);
    for _ in 0..3 {
        controller.handle_line("ok").unwrap();
    }
    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(controller.rows_completed(), 3);
}

#[test]
fn test_disconnect_aborts_stream() {
    let (controller, _link) = connected_controller(grbl_settings(128));

    controller.load_job(job(&["G1 X1"])).unwrap();
    controller.send().unwrap();
    controller.disconnect().unwrap();

    assert!(!controller.is_connected());
    assert_eq!(controller.state(), StreamState::Alarm);
    assert_eq!(controller.status().state, ControllerState::Disconnected);
}

#[test]
fn test_disconnect_while_idle_stays_idle() {
    let (controller, _link) = connected_controller(grbl_settings(128));
    controller.disconnect().unwrap();
    assert_eq!(controller.state(), StreamState::Idle);
}

#[test]
fn test_io_threads_stream_job() {
    let settings = StreamSettings {
        status_poll_interval_ms: 5,
        event_buffer_size: 1024,
        ..grbl_settings(16)
    };
    let (controller, link) = connected_controller(settings);
    link.auto_reply();
    let controller = Arc::new(controller);
    let threads = IoThreads::spawn(&controller).unwrap();

    let lines: Vec<String> = (1..=20).map(|i| format!("G1 X{}", i)).collect();
    controller
        .load_job(
            JobLoader::default()
                .load_lines(&lines, StoreKind::InMemory)
                .unwrap()
                .source,
        )
        .unwrap();
    controller.send().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.state() != StreamState::Idle && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    threads.shutdown();

    assert_eq!(controller.state(), StreamState::Idle);
    assert_eq!(controller.rows_completed(), 20);
    assert_eq!(controller.error_count(), 0);
    assert_eq!(link.lines().len(), 20);
    assert!(link.realtime().contains(&b'?'));
}
