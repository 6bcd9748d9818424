use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
    time::Duration,
};

use hiveline::{
    Auth, CancelToken, Connector, Error, Options, Value,
    decode::{Batch, Column, ColumnarBatch},
    protocol::{
        ColumnSpec, FieldSchema, Guid, OperationHandle, ProtocolVersion, QueryHandle, Request,
        Response, Results, RpcStatus, SessionHandle, TransportError, wire_config,
    },
    schema::ColumnType,
    statement::NamedValue,
    state::QueryState,
};

const START: u8 = 1;
const OK: u8 = 2;
const BAD: u8 = 3;
const COMPLETE: u8 = 5;

fn read_message(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0_u8; 5];
    stream.read_exact(&mut header).unwrap();
    let length = u32::from_be_bytes(header[1..].try_into().unwrap()) as usize;
    let mut payload = vec![0_u8; length];
    stream.read_exact(&mut payload).unwrap();
    (header[0], payload)
}

fn write_message(stream: &mut TcpStream, status: u8, payload: &[u8]) {
    stream.write_all(&[status]).unwrap();
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .unwrap();
    stream.write_all(payload).unwrap();
}

/// Server side of a PLAIN handshake; returns the credentials received.
fn accept_plain(stream: &mut TcpStream, reply: (u8, &[u8])) -> Vec<u8> {
    let (status, mechanism) = read_message(stream);
    assert_eq!(status, START);
    assert_eq!(mechanism, b"PLAIN");

    let (status, credentials) = read_message(stream);
    assert_eq!(status, OK);

    write_message(stream, reply.0, reply.1);
    credentials
}

fn read_request(stream: &mut TcpStream, framed: bool) -> Option<Request> {
    if framed {
        let mut length = [0_u8; 4];
        stream.read_exact(&mut length).ok()?;
        let mut payload = vec![0_u8; u32::from_be_bytes(length) as usize];
        stream.read_exact(&mut payload).ok()?;
        let (request, _) = bincode::decode_from_slice(&payload, wire_config()).ok()?;
        Some(request)
    } else {
        bincode::decode_from_std_read(stream, wire_config()).ok()
    }
}

fn write_response(stream: &mut TcpStream, response: &Response, framed: bool) {
    let payload = bincode::encode_to_vec(response, wire_config()).unwrap();
    if framed {
        stream
            .write_all(&(payload.len() as u32).to_be_bytes())
            .unwrap();
    }
    stream.write_all(&payload).unwrap();
}

/// Serves one connection, answering each request with `respond` until the client
/// hangs up. Returns every request received.
fn serve<F>(framed: bool, mut respond: F) -> (u16, JoinHandle<Vec<Request>>)
where
    F: FnMut(&Request) -> Response + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        if framed {
            let credentials = accept_plain(&mut stream, (COMPLETE, b""));
            assert_eq!(credentials, b"analyst\0analyst\0secret");
        }

        let mut requests = Vec::new();
        while let Some(request) = read_request(&mut stream, framed) {
            let response = respond(&request);
            requests.push(request);
            write_response(&mut stream, &response, framed);
        }
        requests
    });

    (port, handle)
}

fn success() -> RpcStatus {
    RpcStatus::success()
}

fn page(ids: Vec<i64>, names: Vec<&str>, name_nulls: u8) -> Batch {
    Batch::Columnar(ColumnarBatch::new(vec![
        Column::I64 {
            values: ids,
            nulls: vec![0],
        },
        Column::String {
            values: names.into_iter().map(String::from).collect(),
            nulls: vec![name_nulls],
        },
    ]))
}

fn hive_server(request: &Request, fetches: &mut usize) -> Response {
    match request {
        Request::OpenSession { configuration, .. } => Response::OpenSession {
            status: success(),
            session: Some(SessionHandle { id: Guid([1; 16]) }),
            protocol: ProtocolVersion::V7,
            configuration: configuration.clone(),
        },
        Request::ExecuteStatement { .. } => Response::ExecuteStatement {
            status: success(),
            operation: Some(OperationHandle {
                id: Guid([2; 16]),
                has_result_set: true,
                modified_row_count: None,
            }),
        },
        Request::GetResultSetMetadata(_) => Response::GetResultSetMetadata {
            status: success(),
            columns: vec![
                ColumnSpec {
                    name: "id".into(),
                    column_type: ColumnType::BigInt,
                    type_name: "BIGINT".into(),
                },
                ColumnSpec {
                    name: "name".into(),
                    column_type: ColumnType::String,
                    type_name: "STRING".into(),
                },
            ],
        },
        Request::FetchResults { .. } => {
            *fetches += 1;
            match *fetches {
                1 => Response::FetchResults {
                    status: success(),
                    has_more_rows: true,
                    results: Some(page(vec![1, 2], vec!["a", ""], 0b10)),
                },
                _ => Response::FetchResults {
                    status: success(),
                    has_more_rows: false,
                    results: Some(page(vec![3], vec!["c"], 0)),
                },
            }
        }
        Request::CloseOperation(_) => Response::CloseOperation { status: success() },
        Request::CloseSession(_) => Response::CloseSession { status: success() },
        other => Response::Exception {
            message: format!("unsupported request {}", other.method()),
            sql_state: None,
        },
    }
}

fn plain_options(port: u16) -> Options {
    Options::default()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_auth(Auth::plain("analyst", "secret"))
        .with_mem_limit("1g")
}

#[test]
fn direct_query_over_sasl() {
    let mut fetches = 0;
    let (port, server) = serve(true, move |request| hive_server(request, &mut fetches));

    let mut conn = Connector::new(plain_options(port)).connect().unwrap();
    let mut rows = conn
        .query("select id, name from t where id > ?", &[NamedValue::new(1, 0_i64)])
        .unwrap();

    assert_eq!(rows.columns(), vec!["id", "name"]);
    let all: Vec<Vec<Value>> = rows.by_ref().collect::<Result<_, _>>().unwrap();
    rows.close().unwrap();
    conn.close().unwrap();

    assert_eq!(
        all,
        vec![
            vec![Value::BigInt(1), Value::String("a".into())],
            vec![Value::BigInt(2), Value::Null],
            vec![Value::BigInt(3), Value::String("c".into())],
        ]
    );

    let requests = server.join().unwrap();
    let methods: Vec<_> = requests.iter().map(Request::method).collect();
    assert_eq!(
        methods,
        vec![
            "OpenSession",
            "ExecuteStatement",
            "GetResultSetMetadata",
            "FetchResults",
            "FetchResults",
            "CloseOperation",
            "CloseSession",
        ]
    );

    let Request::OpenSession { configuration, .. } = &requests[0] else {
        panic!("expected OpenSession");
    };
    assert_eq!(configuration.get("MEM_LIMIT").map(String::as_str), Some("1g"));
    let Request::ExecuteStatement { statement, .. } = &requests[1] else {
        panic!("expected ExecuteStatement");
    };
    assert_eq!(statement, "select id, name from t where id > 0");
}

#[test]
fn rejected_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        accept_plain(&mut stream, (BAD, b"invalid credentials"));
    });

    let err = Connector::new(plain_options(port)).connect().err().unwrap();
    assert!(matches!(
        err,
        Error::Transport(TransportError::HandshakeFailed(m)) if m == "invalid credentials"
    ));
    server.join().unwrap();
}

#[test]
fn connect_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = Connector::new(plain_options(port)).connect().err().unwrap();
    assert!(matches!(
        err,
        Error::Transport(TransportError::ConnectFailed { .. })
    ));
}

fn beeswax_handle() -> QueryHandle {
    QueryHandle {
        id: "q-42".into(),
        log_context: "q-42".into(),
    }
}

#[test]
fn polling_query_unauthenticated() {
    let mut polls = 0;
    let (port, server) = serve(false, move |request| match request {
        Request::Query { .. } => Response::Query(beeswax_handle()),
        Request::GetState(_) => {
            polls += 1;
            Response::GetState(if polls < 3 {
                QueryState::Running
            } else {
                QueryState::Finished
            })
        }
        Request::GetResultsMetadata(_) => Response::GetResultsMetadata {
            schema: vec![
                FieldSchema {
                    name: "n".into(),
                    type_name: "int".into(),
                },
                FieldSchema {
                    name: "at".into(),
                    type_name: "timestamp".into(),
                },
            ],
        },
        Request::Fetch { .. } => Response::Fetch(Results {
            ready: true,
            data: vec!["7\t2019-01-01 12:00:00".into(), "NULL\tNULL".into()],
            has_more: false,
            ..Default::default()
        }),
        Request::Close(_) => Response::Close,
        other => Response::Exception {
            message: format!("unsupported request {}", other.method()),
            sql_state: None,
        },
    });

    let options = Options::default()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_poll_interval(Duration::from_millis(5));
    let mut client = Connector::new(options).connect_beeswax().unwrap();

    let mut rows = client.query("select n, at from t").unwrap();
    let all = rows.fetch_all().unwrap();
    rows.close().unwrap();
    client.disconnect().unwrap();

    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["n"], Value::Int(7));
    assert_eq!(all[0]["at"].to_string(), "2019-01-01 12:00:00");
    assert!(all[1]["at"].is_null());

    let requests = server.join().unwrap();
    let polls = requests
        .iter()
        .filter(|r| matches!(r, Request::GetState(_)))
        .count();
    assert_eq!(polls, 3);
    assert!(!requests.iter().any(|r| matches!(r, Request::Cancel(_))));
}

#[test]
fn polling_wait_is_cancellable() {
    let (port, server) = serve(false, |request| match request {
        Request::Query { .. } => Response::Query(beeswax_handle()),
        _ => Response::GetState(QueryState::Running),
    });

    let cancel = CancelToken::new();
    let options = Options::default()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_poll_interval(Duration::from_millis(20));
    let mut client = Connector::new(options)
        .with_cancel_token(cancel.clone())
        .connect_beeswax()
        .unwrap();

    let timer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let mut rows = client.query("select sleep(100000)").unwrap();
    assert!(matches!(rows.wait(), Err(Error::Cancelled)));
    drop(rows);
    client.disconnect().unwrap();

    timer.join().unwrap();
    let requests = server.join().unwrap();
    assert!(requests.len() >= 2);
}
