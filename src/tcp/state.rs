//! TCP 连接状态

/// 典型 11 态状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TcpState {
    #[default]
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    CloseWait,
    LastAck,
    TimeWait,
}

impl TcpState {
    /// 是否允许继续收发数据
    pub fn can_receive_data(self) -> bool {
        matches!(
            self,
            TcpState::Established | TcpState::FinWait1 | TcpState::FinWait2
        )
    }

    pub fn can_send_data(self) -> bool {
        matches!(self, TcpState::Established | TcpState::CloseWait)
    }

    /// 连接是否已终结（不再参与分派）
    pub fn is_dead(self) -> bool {
        matches!(self, TcpState::Closed)
    }
}
