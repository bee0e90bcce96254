//! Minimal Bolt client for driving the server over TCP

use boltgraph::bolt::chunk::{read_message, write_message};
use boltgraph::bolt::handshake::{BoltVersion, MAGIC};
use boltgraph::bolt::message::{self, Extra, Response};
use boltgraph::bolt::packstream::{Packer, Unpacker};
use boltgraph::{Failure, Value};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct BoltClient {
    stream: TcpStream,
    pub version: BoltVersion,
}

impl BoltClient {
    /// Connect and negotiate, offering 5.4 down to 5.0 and 4.4
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        Self::connect_with(addr, [[0, 4, 4, 5], [0, 0, 4, 4], [0; 4], [0; 4]]).await
    }

    pub async fn connect_with(addr: SocketAddr, proposals: [[u8; 4]; 4]) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let mut handshake = MAGIC.to_vec();
        for proposal in proposals {
            handshake.extend_from_slice(&proposal);
        }
        stream.write_all(&handshake).await?;
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await?;
        Ok(Self {
            stream,
            version: BoltVersion::new(reply[3], reply[2]),
        })
    }

    pub async fn send(&mut self, signature: u8, fields: &[Value]) {
        let mut packer = Packer::new(self.version);
        packer.pack_struct_header(fields.len() as u8, signature);
        for field in fields {
            packer.pack(field).unwrap();
        }
        write_message(&mut self.stream, &packer.into_bytes())
            .await
            .unwrap();
    }

    /// Send an already packed message body
    pub async fn send_raw(&mut self, body: &[u8]) {
        write_message(&mut self.stream, body).await.unwrap();
    }

    /// Next response, or None once the server hung up
    pub async fn recv(&mut self) -> Option<Response> {
        let body = read_message(&mut self.stream).await.ok()??;
        let mut unpacker = Unpacker::new(&body);
        let (_, signature) = unpacker.read_struct_header().unwrap();
        Some(match signature {
            message::SUCCESS => Response::Success(unpacker.read_map().unwrap()),
            message::RECORD => match unpacker.read_value().unwrap() {
                Value::List(fields) => Response::Record(fields),
                other => panic!("record with {:?}", other),
            },
            message::IGNORED => Response::Ignored,
            message::FAILURE => {
                let map = unpacker.read_map().unwrap();
                let field = |k: &str| map.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
                Response::Failure(Failure::new(&field("code"), field("message")))
            }
            other => panic!("unknown response 0x{:02X}", other),
        })
    }

    pub async fn hello(&mut self, auth: Extra) -> Response {
        let mut extra = auth.clone();
        extra.insert("user_agent".to_string(), Value::from("boltgraph-tests/1.0"));
        self.send(message::HELLO, &[Value::Map(extra)]).await;
        let hello = self.recv().await.expect("no HELLO reply");
        if self.version.uses_logon() {
            if let Response::Success(_) = hello {
                self.send(message::LOGON, &[Value::Map(auth)]).await;
                return self.recv().await.expect("no LOGON reply");
            }
        }
        hello
    }

    pub async fn run(&mut self, query: &str, params: Extra) -> Response {
        self.send(
            message::RUN,
            &[Value::from(query), Value::Map(params), Value::Map(Extra::new())],
        )
        .await;
        self.recv().await.expect("no RUN reply")
    }

    /// PULL everything; returns the records and the final response
    pub async fn pull_all(&mut self) -> (Vec<Vec<Value>>, Response) {
        let mut extra = Extra::new();
        extra.insert("n".to_string(), Value::Integer(-1));
        self.send(message::PULL, &[Value::Map(extra)]).await;
        let mut records = Vec::new();
        loop {
            match self.recv().await.expect("stream ended mid-result") {
                Response::Record(fields) => records.push(fields),
                last => return (records, last),
            }
        }
    }

    /// RUN followed by PULL, panicking on any failure
    pub async fn query(&mut self, query: &str) -> Vec<Vec<Value>> {
        match self.run(query, Extra::new()).await {
            Response::Success(_) => {}
            other => panic!("RUN {} failed: {:?}", query, other),
        }
        match self.pull_all().await {
            (records, Response::Success(_)) => records,
            (_, other) => panic!("PULL for {} failed: {:?}", query, other),
        }
    }

    pub async fn simple(&mut self, signature: u8) -> Option<Response> {
        let fields = if signature == message::BEGIN {
            vec![Value::Map(Extra::new())]
        } else {
            Vec::new()
        };
        self.send(signature, &fields).await;
        self.recv().await
    }
}

pub fn basic_auth(user: &str, password: &str) -> Extra {
    let mut auth = Extra::new();
    auth.insert("scheme".to_string(), Value::from("basic"));
    auth.insert("principal".to_string(), Value::from(user));
    auth.insert("credentials".to_string(), Value::from(password));
    auth
}
