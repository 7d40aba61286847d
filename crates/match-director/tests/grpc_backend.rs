mod common;

use common::{AllocMode, FakeAllocator, candidate, profile, settings};
use core::time::Duration;
use match_director::director::{
    backend::{BackendApi, Compression, GrpcBackend},
    pipeline::Director,
    stream::MatchStreamClient,
};
use match_director_core::proto::{
    self, Assignments, CreateMatchRequest, MatchObject, Roster,
    backend_server::{Backend, BackendServer},
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, codec::CompressionEncoding, transport::Server};

/// Streams a fixed list of matches per profile, then keeps the stream open
/// until the client goes away, like a backend that polls its matchmaking
/// function forever.
#[derive(Default)]
struct StubBackend {
    matches: Vec<MatchObject>,
    listed: Mutex<Vec<String>>,
    assignments: Mutex<Vec<Assignments>>,
    deleted: Mutex<Vec<MatchObject>>,
}

#[tonic::async_trait]
impl Backend for StubBackend {
    type ListMatchesStream = std::pin::Pin<
        Box<dyn tokio_stream::Stream<Item = Result<MatchObject, Status>> + Send + 'static>,
    >;

    async fn create_match(
        &self,
        _request: Request<CreateMatchRequest>,
    ) -> Result<Response<MatchObject>, Status> {
        Err(Status::unimplemented("not used by the director"))
    }

    async fn list_matches(
        &self,
        request: Request<MatchObject>,
    ) -> Result<Response<Self::ListMatchesStream>, Status> {
        let profile = request.into_inner();
        self.listed.lock().unwrap().push(profile.id);

        let items: Vec<Result<MatchObject, Status>> =
            self.matches.iter().cloned().map(Ok).collect();
        let stream = tokio_stream::StreamExt::chain(
            tokio_stream::iter(items),
            tokio_stream::pending(),
        );
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delete_match(
        &self,
        request: Request<MatchObject>,
    ) -> Result<Response<proto::Result>, Status> {
        self.deleted.lock().unwrap().push(request.into_inner());
        Ok(Response::new(proto::Result {
            success: true,
            error: String::new(),
        }))
    }

    async fn create_assignments(
        &self,
        request: Request<Assignments>,
    ) -> Result<Response<proto::Result>, Status> {
        let assignments = request.into_inner();
        if assignments.assignment.is_empty() {
            return Err(Status::invalid_argument("empty assignment"));
        }
        self.assignments.lock().unwrap().push(assignments);
        Ok(Response::new(proto::Result {
            success: true,
            error: String::new(),
        }))
    }

    async fn delete_assignments(
        &self,
        _request: Request<Roster>,
    ) -> Result<Response<proto::Result>, Status> {
        Err(Status::unimplemented("not used by the director"))
    }
}

async fn serve(stub: Arc<StubBackend>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpListenerStream::new(listener);

    let service = BackendServer::from_arc(stub)
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Gzip);

    tokio::spawn(async move {
        Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Arc<GrpcBackend> {
    Arc::new(
        GrpcBackend::connect(
            format!("http://{addr}"),
            Duration::from_secs(5),
            Compression::Gzip,
        )
        .await
        .unwrap(),
    )
}

#[tokio::test]
async fn consume_stops_after_callback_declines() {
    let stub = Arc::new(StubBackend {
        matches: vec![candidate("m1"), candidate("m2"), candidate("m3")],
        ..StubBackend::default()
    });
    let backend = connect(serve(stub.clone()).await).await;
    let client = MatchStreamClient::new(backend, CancellationToken::new());

    let mut seen = Vec::new();
    let received = client
        .consume(&profile("p1"), |m| {
            seen.push(m.id);
            Ok(seen.len() < 2)
        })
        .await
        .unwrap();

    assert_eq!(received, 2);
    assert_eq!(seen, ["m1", "m2"]);
    assert_eq!(*stub.listed.lock().unwrap(), ["p1"]);
}

#[tokio::test]
async fn consume_returns_on_shutdown_while_stream_is_idle() {
    let stub = Arc::new(StubBackend {
        matches: vec![candidate("m1")],
        ..StubBackend::default()
    });
    let backend = connect(serve(stub).await).await;
    let shutdown = CancellationToken::new();
    let client = MatchStreamClient::new(backend, shutdown.clone());

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
    });

    let received = client.consume(&profile("p1"), |_| Ok(true)).await.unwrap();
    assert_eq!(received, 1);
    cancel.await.unwrap();
}

#[tokio::test]
async fn delete_sends_only_the_id() {
    let stub = Arc::new(StubBackend::default());
    let backend = connect(serve(stub.clone()).await).await;

    let result = backend.delete_match(candidate("m9")).await.unwrap();
    assert!(result.error.is_empty());

    let deleted = stub.deleted.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, "m9");
    assert!(deleted[0].rosters.is_empty());
    assert!(deleted[0].properties.is_empty());
}

#[tokio::test]
async fn rejected_assignment_surfaces_as_rpc_error() {
    let stub = Arc::new(StubBackend::default());
    let backend = connect(serve(stub).await).await;

    let err = backend
        .create_assignments(Assignments::default())
        .await
        .unwrap_err();
    assert!(matches!(err, match_director_core::Error::Rpc(status) if status.code() == tonic::Code::InvalidArgument));
}

#[tokio::test]
async fn director_assigns_over_grpc() {
    let stub = Arc::new(StubBackend {
        matches: vec![candidate("m1"), candidate("m2")],
        ..StubBackend::default()
    });
    let backend = connect(serve(stub.clone()).await).await;
    let allocator = Arc::new(FakeAllocator::new(AllocMode::Succeed));

    let director = Director::new(backend, allocator.clone(), settings(Some(1), Some(2)));
    let reports = director.run(vec![profile("p1")]).await;

    assert_eq!(reports[0].assigned, 2);
    let assignments = stub.assignments.lock().unwrap();
    let mut connections: Vec<_> = assignments.iter().map(|a| a.assignment.clone()).collect();
    connections.sort();
    assert_eq!(connections, ["10.0.0.1:7000", "10.0.0.1:7001"]);
    assert!(stub.deleted.lock().unwrap().is_empty());
}
