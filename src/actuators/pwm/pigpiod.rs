use anyhow::{bail, Context};
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::PwmService;

const PI_CMD_SERVO: u32 = 8;

const FRAME_LEN: usize = 16;

/// Client du démon pigpiod (socket de commandes).
///
/// Les trames sortantes et les réponses sont bufferisées dans le client :
/// une commande abandonnée en cours de route (interruption) est terminée
/// par la commande suivante, sans désynchroniser le flux.
pub struct Pigpiod {
    stream: TcpStream,
    outbound: [u8; FRAME_LEN],
    sent: usize,
    reply: [u8; FRAME_LEN],
    filled: usize,
    // La réponse de la dernière trame n'a pas encore été consommée.
    awaiting: bool,
}

impl Pigpiod {
    pub async fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        info!("[PIGPIO] Connexion à {}:{} ...", host, port);

        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("[PIGPIO] Connexion à pigpiod ({}:{}) impossible. Le démon est-il lancé ?", host, port))?;
        stream.set_nodelay(true)?;

        info!("[PIGPIO] Connecté.");
        Ok(Pigpiod {
            stream,
            outbound: [0u8; FRAME_LEN],
            sent: FRAME_LEN,
            reply: [0u8; FRAME_LEN],
            filled: 0,
            awaiting: false,
        })
    }

    /// Envoi une commande et retourne le résultat (>= 0).
    async fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> anyhow::Result<i32> {
        if self.awaiting {
            debug!("[PIGPIO] Fin d'une commande interrompue ({}/{} octets envoyés, {}/{} reçus).", self.sent, FRAME_LEN, self.filled, FRAME_LEN);
            self.flush().await?;
            self.receive().await.context("[PIGPIO] Purge de la réponse impossible")?;
        }

        self.outbound = encode(cmd, p1, p2, 0);
        self.sent = 0;
        self.awaiting = true;

        self.flush().await?;
        let reply = self.receive().await?;

        let res = result(&reply);
        if res < 0 {
            let (name, description) = describe(res);
            bail!("[PIGPIO] Commande {} refusée: {} ({}) [{}]", cmd, name, description, res);
        }

        Ok(res)
    }

    /// Termine l'envoi de la trame en cours. `write` n'écrit rien s'il est annulé.
    async fn flush(&mut self) -> anyhow::Result<()> {
        while self.sent < FRAME_LEN {
            let n = self
                .stream
                .write(&self.outbound[self.sent..])
                .await
                .context("[PIGPIO] Envoi de la commande impossible")?;
            if n == 0 {
                bail!("[PIGPIO] Connexion fermée pendant l'envoi");
            }
            self.sent += n;
        }

        Ok(())
    }

    /// Lit la réponse complète. `read` ne perd aucun octet s'il est annulé.
    async fn receive(&mut self) -> anyhow::Result<[u8; FRAME_LEN]> {
        while self.filled < FRAME_LEN {
            let n = self
                .stream
                .read(&mut self.reply[self.filled..])
                .await
                .context("[PIGPIO] Réponse du démon illisible")?;
            if n == 0 {
                bail!("[PIGPIO] Connexion fermée par le démon");
            }
            self.filled += n;
        }

        self.filled = 0;
        self.awaiting = false;
        Ok(self.reply)
    }
}

impl PwmService for Pigpiod {
    async fn set_servo_pulsewidth(&mut self, pin: u8, width: u32) -> anyhow::Result<()> {
        self.command(PI_CMD_SERVO, pin as u32, width).await?;
        Ok(())
    }

    async fn stop(mut self) -> anyhow::Result<()> {
        self.stream.shutdown().await.context("[PIGPIO] Fermeture de la connexion impossible")?;
        info!("[PIGPIO] Connexion fermée.");
        Ok(())
    }
}

/// Trame de commande : 4 mots u32 little-endian.
fn encode(cmd: u32, p1: u32, p2: u32, p3: u32) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    for (chunk, word) in frame.chunks_exact_mut(4).zip([cmd, p1, p2, p3]) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    frame
}

/// Le résultat est le dernier mot de la réponse (signé).
fn result(reply: &[u8; FRAME_LEN]) -> i32 {
    i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]])
}

fn describe(code: i32) -> (&'static str, &'static str) {
    match code {
        -1 => ("PI_INIT_FAILED", "gpioInitialise failed"),
        -2 => ("PI_BAD_USER_GPIO", "gpio not 0-31"),
        -3 => ("PI_BAD_GPIO", "gpio not 0-53"),
        -7 => ("PI_BAD_PULSEWIDTH", "pulsewidth not 0 or 500-2500"),
        -41 => ("PI_NOT_PERMITTED", "no permission to update gpio"),
        -42 => ("PI_SOME_PERMITTED", "no permission to update one or more gpios"),
        -99 => ("PI_UNKNOWN_COMMAND", "unknown command"),
        _ => ("PI_UNKNOWN", "unknown error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    fn reply(cmd: u32, p1: u32, p2: u32, res: i32) -> [u8; FRAME_LEN] {
        encode(cmd, p1, p2, res as u32)
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn frame_is_little_endian() {
        let frame = encode(PI_CMD_SERVO, 4, 1500, 0);
        assert_eq!(&frame[0..4], &[8, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[4, 0, 0, 0]);
        assert_eq!(&frame[8..12], &1500u32.to_le_bytes());
        assert_eq!(&frame[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn negative_result_is_decoded() {
        assert_eq!(result(&reply(8, 4, 100, -7)), -7);
        assert_eq!(describe(-7).0, "PI_BAD_PULSEWIDTH");
        assert_eq!(describe(-1234).0, "PI_UNKNOWN");
    }

    #[tokio::test]
    async fn servo_command_reaches_daemon() {
        let (listener, port) = listener().await;

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; FRAME_LEN];
            socket.read_exact(&mut frame).await.unwrap();
            socket.write_all(&reply(8, 4, 1500, 0)).await.unwrap();
            frame
        });

        let mut client = Pigpiod::connect("127.0.0.1", port).await.unwrap();
        client.set_servo_pulsewidth(4, 1500).await.unwrap();

        assert_eq!(daemon.await.unwrap(), encode(PI_CMD_SERVO, 4, 1500, 0));
    }

    #[tokio::test]
    async fn daemon_error_is_reported() {
        let (listener, port) = listener().await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; FRAME_LEN];
            socket.read_exact(&mut frame).await.unwrap();
            socket.write_all(&reply(8, 4, 100, -7)).await.unwrap();
        });

        let mut client = Pigpiod::connect("127.0.0.1", port).await.unwrap();
        let err = client.set_servo_pulsewidth(4, 100).await.unwrap_err();

        assert!(err.to_string().contains("PI_BAD_PULSEWIDTH"));
    }

    #[tokio::test]
    async fn abandoned_reply_is_drained() {
        let (listener, port) = listener().await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Réponse d'une commande abandonnée.
            socket.write_all(&reply(8, 4, 100, -7)).await.unwrap();
            let mut frame = [0u8; FRAME_LEN];
            socket.read_exact(&mut frame).await.unwrap();
            socket.write_all(&reply(8, 4, 0, 0)).await.unwrap();
        });

        let mut client = Pigpiod::connect("127.0.0.1", port).await.unwrap();
        client.awaiting = true;

        client.set_servo_pulsewidth(4, 0).await.unwrap();
        assert!(!client.awaiting);
    }

    #[tokio::test]
    async fn command_cancelled_mid_reply_resumes() {
        let (listener, port) = listener().await;
        let (resume_tx, resume_rx) = oneshot::channel::<()>();

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; FRAME_LEN];

            socket.read_exact(&mut frame).await.unwrap();
            let first = reply(8, 4, 1500, 0);
            socket.write_all(&first[..8]).await.unwrap();

            resume_rx.await.unwrap();
            socket.write_all(&first[8..]).await.unwrap();

            socket.read_exact(&mut frame).await.unwrap();
            socket.write_all(&reply(8, 4, 0, 0)).await.unwrap();
            frame
        });

        let mut client = Pigpiod::connect("127.0.0.1", port).await.unwrap();

        let interrupted = timeout(Duration::from_millis(50), client.set_servo_pulsewidth(4, 1500)).await;
        assert!(interrupted.is_err());
        assert!(client.awaiting);

        resume_tx.send(()).unwrap();

        timeout(Duration::from_secs(2), client.set_servo_pulsewidth(4, 0))
            .await
            .expect("la commande suivante ne doit pas bloquer")
            .unwrap();

        assert_eq!(daemon.await.unwrap(), encode(PI_CMD_SERVO, 4, 0, 0));
        assert!(!client.awaiting);
    }

    #[tokio::test]
    async fn command_cancelled_before_send_completes_is_finished() {
        let (listener, port) = listener().await;

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frames = [[0u8; FRAME_LEN]; 2];
            for frame in frames.iter_mut() {
                socket.read_exact(frame).await.unwrap();
                socket.write_all(&reply(8, 4, 0, 0)).await.unwrap();
            }
            frames
        });

        let mut client = Pigpiod::connect("127.0.0.1", port).await.unwrap();
        // Trame à moitié envoyée au moment de l'interruption.
        client.outbound = encode(PI_CMD_SERVO, 4, 1500, 0);
        client.stream.write_all(&client.outbound[..8]).await.unwrap();
        client.sent = 8;
        client.awaiting = true;

        client.set_servo_pulsewidth(4, 0).await.unwrap();

        let frames = daemon.await.unwrap();
        assert_eq!(frames[0], encode(PI_CMD_SERVO, 4, 1500, 0));
        assert_eq!(frames[1], encode(PI_CMD_SERVO, 4, 0, 0));
    }

    #[tokio::test]
    async fn stop_closes_connection() {
        let (listener, port) = listener().await;

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap()
        });

        let client = Pigpiod::connect("127.0.0.1", port).await.unwrap();
        client.stop().await.unwrap();

        assert_eq!(daemon.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_without_daemon_fails() {
        let (listener, port) = listener().await;
        drop(listener);

        let err = Pigpiod::connect("127.0.0.1", port).await.err().unwrap();
        assert!(err.to_string().contains("pigpiod"));
    }
}
