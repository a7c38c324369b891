pub mod hdr;
pub mod net;
pub mod packet;
pub mod pcap;
pub mod sim;
pub mod switch;
pub mod tcp;

#[cfg(test)]
mod test;
