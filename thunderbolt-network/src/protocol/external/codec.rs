//! A Tokio codec mapping byte streams to Thunderbolt message streams.

use std::fmt;
use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use thunderbolt_chain::{
    block::{self, Block},
    parameters::Network,
    serialization::{
        sha256d, SerializationError as Error, ThunderboltDeserialize, ThunderboltSerialize,
    },
    transaction::Transaction,
};

use crate::constants;
use crate::meta_addr::MetaAddr;

use super::{
    command::Command,
    inv::InventoryHash,
    message::{GetBlocks, GetHeaders, Message, Version},
    types::*,
};

/// The length of a message envelope:
/// magic (4) | command (12) | body length (4) | checksum (4).
const HEADER_LEN: usize = 24usize;

/// A codec which produces messages from byte streams and vice versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

/// A builder for specifying [`Codec`] options.
pub struct Builder {
    /// The network magic to use in encoding.
    network: Network,
    /// The protocol version to speak when encoding/decoding.
    version: ProtocolVersion,
    /// The maximum allowable message length.
    max_len: usize,
}

impl Codec {
    /// Return a builder for constructing a [`Codec`].
    pub fn builder() -> Builder {
        Builder {
            network: Network::Mainnet,
            version: constants::CURRENT_VERSION,
            max_len: constants::MAX_PROTOCOL_MESSAGE_LEN,
        }
    }

    /// Reconfigure the version used by the codec, e.g., after completing a handshake.
    pub fn reconfigure_version(&mut self, version: ProtocolVersion) {
        self.builder.version = version;
    }
}

impl Builder {
    /// Finalize the builder and return a [`Codec`].
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    /// Configure the codec for the given [`Network`].
    pub fn for_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Configure the codec for the given protocol version.
    #[allow(dead_code)]
    pub fn for_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Configure the codec's maximum accepted payload size, in bytes.
    #[allow(dead_code)]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use Error::Parse;

        // The header carries a checksum of the body, so the body has to
        // be serialized first.
        let mut body = Vec::new();
        self.write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(Parse("body length exceeded maximum size"));
        }

        let command = item.command();
        tracing::trace!(%item, len = body.len(), "encoding message");

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer.write_all(&Magic::from(self.builder.network).0[..])?;
        header_writer.write_all(command.bytes())?;
        header_writer.write_u32::<LittleEndian>(body.len() as u32)?;
        header_writer.write_all(&sha256d::Checksum::from(&body[..]).0)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

impl Codec {
    /// Write the body of the message into the given writer.
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), Error> {
        match msg {
            Message::Version(inner) => {
                inner.thunderbolt_serialize(&mut writer)?;
            }
            Message::Verack => { /* Empty payload -- no-op */ }
            Message::Ping(nonce) => {
                nonce.thunderbolt_serialize(&mut writer)?;
            }
            Message::Pong(nonce) => {
                nonce.thunderbolt_serialize(&mut writer)?;
            }
            Message::GetAddr => { /* Empty payload -- no-op */ }
            Message::Addr(addrs) => addrs.thunderbolt_serialize(&mut writer)?,
            Message::GetBlocks(get_blocks) => get_blocks.thunderbolt_serialize(&mut writer)?,
            Message::GetHeaders(get_headers) => get_headers.thunderbolt_serialize(&mut writer)?,
            Message::Headers(headers) => headers.thunderbolt_serialize(&mut writer)?,
            Message::Inv(hashes) => hashes.thunderbolt_serialize(&mut writer)?,
            Message::GetData(hashes) => hashes.thunderbolt_serialize(&mut writer)?,
            Message::NotFound(hashes) => hashes.thunderbolt_serialize(&mut writer)?,
            Message::Block(block) => block.thunderbolt_serialize(&mut writer)?,
            Message::Tx(transaction) => transaction.thunderbolt_serialize(&mut writer)?,
            Message::Mempool => { /* Empty payload -- no-op */ }
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        /// `None` for commands we don't speak: the body is consumed
        /// and dropped without erroring, so unknown traffic from newer
        /// peers never kills the connection.
        command: Option<Command>,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", &command)
                .field("checksum", &checksum)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        use Error::Parse;
        match self.state {
            DecodeState::Head => {
                // First check that the src buffer contains an entire header.
                if src.len() < HEADER_LEN {
                    tracing::trace!(?self.state, "src buffer does not have an entire header, waiting");
                    // Signal that decoding requires more data.
                    return Ok(None);
                }

                // Now that we know that src contains a header, split off the header section.
                let header = src.split_to(HEADER_LEN);

                // Create a cursor over the header and parse its fields.
                let mut header_reader = Cursor::new(&header);
                let magic = Magic(<[u8; 4]>::thunderbolt_deserialize(&mut header_reader)?);
                let command_bytes = <[u8; 12]>::thunderbolt_deserialize(&mut header_reader)?;
                let command = Command::from_bytes(&command_bytes);
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum =
                    sha256d::Checksum(<[u8; 4]>::thunderbolt_deserialize(&mut header_reader)?);

                if magic != Magic::from(self.builder.network) {
                    return Err(Parse("supplied magic did not meet expectations"));
                }
                if body_len > self.builder.max_len {
                    return Err(Parse("body length exceeded maximum size"));
                }

                // Reserve buffer space for the expected body and the following header.
                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };

                // Now that the state is updated, recurse to attempt body decoding.
                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => {
                if src.len() < body_len {
                    // Need to wait for the full body
                    tracing::trace!(?self.state, len = src.len(), "src buffer does not have an entire body, waiting");
                    return Ok(None);
                }

                // Now that we know we have the full body, split off the body,
                // and reset the decoder state for the next message.
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                let command = match command {
                    Some(command) => command,
                    None => {
                        // An unknown command: drop the message and move
                        // on to whatever is already buffered behind it.
                        tracing::debug!("dropping message with unknown command");
                        return self.decode(src);
                    }
                };

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(Parse(
                        "supplied message checksum does not match computed checksum",
                    ));
                }

                let mut body_reader = Cursor::new(&body);
                let msg = match command {
                    Command::Version => {
                        Message::Version(Version::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::Verack => Message::Verack,
                    Command::Ping => {
                        Message::Ping(Nonce::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::Pong => {
                        Message::Pong(Nonce::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::GetAddr => Message::GetAddr,
                    Command::Addr => {
                        Message::Addr(Vec::<MetaAddr>::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::GetBlocks => {
                        Message::GetBlocks(GetBlocks::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::GetHeaders => {
                        Message::GetHeaders(GetHeaders::thunderbolt_deserialize(&mut body_reader)?)
                    }
                    Command::Headers => Message::Headers(
                        <Vec<block::CountedHeader>>::thunderbolt_deserialize(&mut body_reader)?,
                    ),
                    Command::Inv => Message::Inv(<Vec<InventoryHash>>::thunderbolt_deserialize(
                        &mut body_reader,
                    )?),
                    Command::GetData => Message::GetData(
                        <Vec<InventoryHash>>::thunderbolt_deserialize(&mut body_reader)?,
                    ),
                    Command::NotFound => Message::NotFound(
                        <Vec<InventoryHash>>::thunderbolt_deserialize(&mut body_reader)?,
                    ),
                    Command::Block => Message::Block(<std::sync::Arc<Block>>::thunderbolt_deserialize(
                        &mut body_reader,
                    )?),
                    Command::Tx => Message::Tx(<std::sync::Arc<Transaction>>::thunderbolt_deserialize(
                        &mut body_reader,
                    )?),
                    Command::MemPool => Message::Mempool,
                };
                tracing::trace!("finished message decoding");
                Ok(Some(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::prelude::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::runtime::Runtime;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn test_version() -> Message {
        let services = PeerServices::NODE_NETWORK;
        Message::Version(Version::new(
            crate::constants::CURRENT_VERSION,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 8533),
            services,
            services,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 8533),
            Nonce(0x9082_4908_8927_9238),
            "Beaver".to_owned(),
            block::Height(540_000),
            true,
        ))
    }

    #[test]
    fn version_message_round_trip() {
        thunderbolt_test::init();
        let rt = Runtime::new().unwrap();

        let v = test_version();

        let v_bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(Cursor::new(&mut bytes), Codec::builder().finish());
                fw.send(v.clone())
                    .await
                    .expect("message should be serialized");
            }
            bytes
        });

        let v_parsed = rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(&v_bytes), Codec::builder().finish());
            fr.next()
                .await
                .expect("a next message should be available")
                .expect("that message should deserialize")
        });

        assert_eq!(v, v_parsed);
    }

    #[test]
    fn corrupted_checksum_is_an_error() {
        thunderbolt_test::init();
        let rt = Runtime::new().unwrap();

        let mut bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(Cursor::new(&mut bytes), Codec::builder().finish());
                fw.send(Message::Ping(Nonce(77)))
                    .await
                    .expect("message should be serialized");
            }
            bytes
        });
        // Flip a bit in the body; the checksum no longer matches.
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(&bytes), Codec::builder().finish());
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("the corrupted message should not deserialize");
        });
    }

    #[test]
    fn wrong_network_magic_is_an_error() {
        thunderbolt_test::init();
        let rt = Runtime::new().unwrap();

        let bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().for_network(Network::Testnet).finish(),
                );
                fw.send(Message::Verack)
                    .await
                    .expect("message should be serialized");
            }
            bytes
        });

        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&bytes),
                Codec::builder().for_network(Network::Mainnet).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("a testnet message should not decode as mainnet");
        });
    }

    #[test]
    fn unknown_commands_are_skipped() {
        thunderbolt_test::init();
        let rt = Runtime::new().unwrap();

        // A hand-rolled envelope with a command we don't speak,
        // followed by an honest ping.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&Magic::from(Network::Mainnet).0);
        bytes.extend_from_slice(b"sendheaders\0");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&sha256d::Checksum::from(&[][..]).0);

        rt.block_on(async {
            let mut tail = Vec::new();
            {
                let mut fw = FramedWrite::new(Cursor::new(&mut tail), Codec::builder().finish());
                fw.send(Message::Ping(Nonce(9)))
                    .await
                    .expect("message should be serialized");
            }
            bytes.extend_from_slice(&tail);

            let mut fr = FramedRead::new(Cursor::new(&bytes), Codec::builder().finish());
            let first = fr
                .next()
                .await
                .expect("a next message should be available")
                .expect("the ping behind the unknown command should decode");
            assert_eq!(first, Message::Ping(Nonce(9)));
        });
    }

    #[test]
    fn max_msg_size_round_trip() {
        use thunderbolt_chain::ThunderboltDeserializeInto;
        thunderbolt_test::init();

        let rt = Runtime::new().unwrap();

        let tx: Transaction = thunderbolt_test::vectors::DUMMY_COINBASE_TX
            .as_slice()
            .thunderbolt_deserialize_into()
            .unwrap();
        let msg = Message::Tx(std::sync::Arc::new(tx));

        // The serialized dummy transaction body is 81 bytes.
        let size = 81;

        // reducing the max size to body size - 1
        rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().with_max_body_len(size - 1).finish(),
                );
                fw.send(msg.clone()).await.expect_err(
                    "message should not encode as it is bigger than the max allowed value",
                );
            }
        });

        // send again with the msg body size as max size
        let msg_bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().with_max_body_len(size).finish(),
                );
                fw.send(msg.clone())
                    .await
                    .expect("message should encode with the msg body size as max allowed value");
            }
            bytes
        });

        // receive with a reduced max size
        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&msg_bytes),
                Codec::builder().with_max_body_len(size - 1).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("message should not decode as it is bigger than the max allowed value")
        });

        // receive again with the tx size as max size
        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&msg_bytes),
                Codec::builder().with_max_body_len(size).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect("message should decode with the msg body size as max allowed value")
        });
    }
}
