use super::messages::{
    METHOD_GET_TELEMETRY, MissionUpdate, TelemetryRecord, TelemetryRequest, TelemetryResponse,
};
use super::sim::SimVehicle;
use super::transport::{TcpVehicleLink, TelemetryTransport, TransportError};
use crate::util::Vec3D;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_tcp_link_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let request: TelemetryRequest = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(request.method(), METHOD_GET_TELEMETRY);
        assert_eq!(request.id(), 1);

        let record =
            TelemetryRecord::new([10.0, 20.0, 30.0], None, 76.5, Some(1.2), Some(vec![4, 5]));
        let mut reply =
            serde_json::to_string(&TelemetryResponse::success(request.id(), record)).unwrap();
        reply.push('\n');
        write_half.write_all(reply.as_bytes()).await.unwrap();
    });

    let mut link = TcpVehicleLink::connect(addr).await.unwrap();
    let record = link.request_telemetry(Duration::from_secs(2)).await.unwrap();
    assert_eq!(record.position().to_array(), [10.0, 20.0, 30.0]);
    assert_eq!(record.battery_soc(), 76.5);
    assert_eq!(record.payload_capacity(), 1.2);
    assert_eq!(record.active_tasks(), &[4, 5]);
    // absent attitude defaults to level flight
    assert_eq!(record.attitude(), [1.0, 0.0, 0.0, 0.0]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_tcp_link_times_out_on_silent_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // hold the socket open without ever replying
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);
    });

    let mut link = TcpVehicleLink::connect(addr).await.unwrap();
    let err = link.request_telemetry(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout));
    server.abort();
}

#[tokio::test]
async fn test_tcp_link_reports_closed_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        drop(write_half);
    });

    let mut link = TcpVehicleLink::connect(addr).await.unwrap();
    let err = link.request_telemetry(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, TransportError::Closed));
    server.await.unwrap();
}

#[test]
fn test_mission_update_carries_tasks_and_waypoints() {
    let update = MissionUpdate::new(7, vec![5], vec![[60.0, 60.0, 30.0]]);
    let encoded = serde_json::to_value(&update).unwrap();
    assert_eq!(encoded["method"], "update_mission");
    assert_eq!(encoded["params"]["task_ids"][0], 5);
    assert_eq!(update.task_ids(), &[5]);
    assert_eq!(update.waypoints(), &[[60.0, 60.0, 30.0]]);
}

#[tokio::test]
async fn test_sim_vehicle_drains_between_polls() {
    let vehicle = SimVehicle::new(Vec3D::new(0.0, 0.0, 30.0), 80.0, 1.0);
    vehicle.set_discharge_rate(100.0);
    let mut link = vehicle.link();

    let first = link.request_telemetry(Duration::from_secs(1)).await.unwrap();
    assert_eq!(first.battery_soc(), 80.0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = link.request_telemetry(Duration::from_secs(1)).await.unwrap();
    assert!(second.battery_soc() < first.battery_soc());
    assert!(second.battery_soc() >= 0.0);
}

#[tokio::test]
async fn test_sim_vehicle_blackout_runs_into_timeout() {
    let vehicle = SimVehicle::new(Vec3D::new(0.0, 0.0, 30.0), 80.0, 1.0);
    vehicle.set_responsive(false);
    let mut link = vehicle.link();

    let started = std::time::Instant::now();
    let err = link.request_telemetry(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(50));
}
